mod common;
mod guard;
mod lottery;
