use crate::infra::{InMemoryAdmissionRepository, InMemoryNotifier};
use childcare_admission::admission::domain::age_in_years;
use childcare_admission::admission::lottery::{LotteryResult, WaitlistedApplicant};
use childcare_admission::admission::{
    AdmissionConfig, AdmissionError, AdmissionRepository, AdmissionService, Applicant,
    ApplicantStatus, ApplicationId, ClassId, ClassRoom, IdentityCategory, InstitutionId,
    InstitutionStatistics, NationalId, ParticipantId, ParticipantRole, RandomSource,
    RosterImporter, WaitlistReason,
};
use childcare_admission::error::AppError;
use chrono::NaiveDate;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct LotteryArgs {
    /// Applicant roster CSV (participant_id, application_id, national_id, birth_date, role, identity[, status])
    #[arg(long)]
    pub(crate) roster: PathBuf,
    /// Class roster CSV (class_id, name, min_age, max_age, capacity[, enrolled])
    #[arg(long)]
    pub(crate) classes: PathBuf,
    /// Legal capacity of the institution
    #[arg(long)]
    pub(crate) capacity: u32,
    /// Fixed seed for a reproducible draw
    #[arg(long)]
    pub(crate) seed: Option<u64>,
    /// Institution identifier stamped on the imported records
    #[arg(long, default_value = "cli-institution")]
    pub(crate) institution: String,
    /// Run date used for age calculation (defaults to today)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
    /// Print the result as JSON instead of a table
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Seed for the demo draw
    #[arg(long, default_value_t = 7)]
    pub(crate) seed: u64,
    /// Run date for the demo season
    #[arg(long, value_parser = crate::infra::parse_date, default_value = "2025-08-01")]
    pub(crate) as_of: NaiveDate,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            seed: 7,
            as_of: NaiveDate::from_ymd_opt(2025, 8, 1).unwrap_or_default(),
        }
    }
}

pub(crate) const DEMO_INSTITUTION: &str = "demo-sunrise";
pub(crate) const DEMO_CAPACITY: u32 = 20;

pub(crate) fn run_lottery_command(args: LotteryArgs) -> Result<(), AppError> {
    let LotteryArgs {
        roster,
        classes,
        capacity,
        seed,
        institution,
        as_of,
        json,
    } = args;

    let institution = InstitutionId(institution);
    let applicants = RosterImporter::applicants_from_path(roster, &institution)?;
    let classes = RosterImporter::classes_from_path(classes)?;

    let repository = Arc::new(InMemoryAdmissionRepository::default());
    repository
        .insert_institution(institution.clone(), capacity, classes, applicants)
        .map_err(AdmissionError::from)?;

    let config = AdmissionConfig {
        random: seed.map_or(RandomSource::Entropy, RandomSource::Seeded),
        season: None,
        as_of,
    };
    let service = AdmissionService::new(repository, Arc::new(InMemoryNotifier::default()), config);
    let result = service.run_lottery(&institution)?;

    if json {
        let rendered = serde_json::to_string_pretty(&result).map_err(std::io::Error::other)?;
        println!("{rendered}");
    } else {
        render_lottery(&result);
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let institution = InstitutionId(DEMO_INSTITUTION.to_string());
    let repository = Arc::new(InMemoryAdmissionRepository::default());
    seed_demo_institution(&repository)?;

    let notifier = Arc::new(InMemoryNotifier::default());
    let config = AdmissionConfig {
        random: RandomSource::Seeded(args.seed),
        season: None,
        as_of: Some(args.as_of),
    };
    let service = AdmissionService::new(repository.clone(), notifier.clone(), config);

    println!("Childcare admission demo ({} as of {})", institution, args.as_of);
    render_statistics(&service.statistics(&institution)?);

    println!("\n1. Annual lottery");
    let result = service.run_lottery(&institution)?;
    render_lottery(&result);

    println!("\n2. Withdrawal frees a seat");
    let Some(withdrawn) = result.accepted.first() else {
        println!("  Nobody was admitted; nothing to withdraw.");
        return Ok(());
    };
    let record = find_record(repository.as_ref(), &institution, &withdrawn.participant_id)?;
    service.change_status(
        &record.application_id,
        &record.national_id,
        ApplicantStatus::WithdrawalApproved,
    )?;
    println!(
        "  {} withdrew from {}",
        withdrawn.participant_id, withdrawn.class_id
    );

    println!("\n3. Manual admission out of waitlist order");
    let classes = repository.classes(&institution)?;
    let freed = classes.iter().find(|class| class.id == withdrawn.class_id);
    match pick_out_of_order(&result.waitlisted, repository.as_ref(), &institution, freed, args.as_of)? {
        Some(candidate) => {
            let admission =
                service.manual_admit(&candidate.application_id, &candidate.national_id, &withdrawn.class_id)?;
            println!(
                "  Admitted {} into {} (released order {:?})",
                admission.participant_id, admission.class_id, admission.released_order
            );
            match &admission.order_violation {
                Some(violation) => {
                    println!(
                        "  Order violation: order {} admitted ahead of {} waitlisted children",
                        violation.admitted_order, violation.skipped_count
                    );
                    for skipped in &violation.skipped {
                        println!("    - #{} {}", skipped.waitlist_order, skipped.participant_id);
                    }
                }
                None => println!("  No waitlisted child was skipped."),
            }
        }
        None => println!("  No waitlisted child fits the freed class."),
    }

    println!("\n4. Head of the waitlist is rejected on review");
    let head = repository
        .applicants(&institution)?
        .into_iter()
        .find(|applicant| applicant.waitlist_order == Some(1));
    match head {
        Some(head) => {
            let change =
                service.change_status(&head.application_id, &head.national_id, ApplicantStatus::Rejected)?;
            println!(
                "  {} moved {} -> {}; orders behind it shift up by one",
                change.participant_id,
                change.from.label(),
                change.to.label()
            );
            render_waitlist(&repository.applicants(&institution)?);
        }
        None => println!("  The waitlist is empty."),
    }

    println!("\n5. Closing statistics");
    render_statistics(&service.statistics(&institution)?);
    println!("\n{} notices queued for delivery", notifier.notices().len());
    Ok(())
}

/// Load the synthetic institution used by `demo` and `serve --demo-data`.
pub(crate) fn seed_demo_institution(
    repository: &InMemoryAdmissionRepository,
) -> Result<(), AppError> {
    let institution = InstitutionId(DEMO_INSTITUTION.to_string());
    repository
        .insert_institution(
            institution.clone(),
            DEMO_CAPACITY,
            demo_classes(),
            demo_applicants(&institution),
        )
        .map_err(AdmissionError::from)?;
    Ok(())
}

fn demo_classes() -> Vec<ClassRoom> {
    [
        ("c-bear", "Bears", 2, 3, 6, 2),
        ("c-owl", "Owls", 3, 4, 6, 2),
        ("c-fox", "Foxes", 4, 5, 4, 1),
    ]
    .into_iter()
    .map(|(id, name, min_age, max_age, capacity, enrolled)| ClassRoom {
        id: ClassId(id.to_string()),
        name: name.to_string(),
        min_age,
        max_age,
        capacity,
        enrolled,
    })
    .collect()
}

fn demo_applicants(institution: &InstitutionId) -> Vec<Applicant> {
    const IDENTITIES: [IdentityCategory; 6] = [
        IdentityCategory::General,
        IdentityCategory::LowIncome,
        IdentityCategory::General,
        IdentityCategory::Indigenous,
        IdentityCategory::General,
        IdentityCategory::Disability,
    ];

    let mut applicants = Vec::new();
    for index in 0..18u32 {
        let number = index + 1;
        let child = Applicant {
            id: ParticipantId(format!("child-{number:02}")),
            application_id: ApplicationId(format!("app-{number:02}")),
            institution_id: institution.clone(),
            national_id: NationalId(format!("K{number:04}")),
            birth_date: NaiveDate::from_ymd_opt(2020 + (index % 4) as i32, index % 12 + 1, 15),
            role: Some(ParticipantRole::Child),
            identity: Some(IDENTITIES[index as usize % IDENTITIES.len()]),
            status: ApplicantStatus::PendingReview,
            waitlist_order: None,
            class_id: None,
        };
        if index % 3 == 0 {
            applicants.push(Applicant {
                id: ParticipantId(format!("parent-{number:02}")),
                national_id: NationalId(format!("P{number:04}")),
                birth_date: NaiveDate::from_ymd_opt(1990, 6, 1),
                role: Some(ParticipantRole::Parent),
                ..child.clone()
            });
        }
        applicants.push(child);
    }
    applicants
}

fn find_record(
    repository: &InMemoryAdmissionRepository,
    institution: &InstitutionId,
    id: &ParticipantId,
) -> Result<Applicant, AppError> {
    repository
        .applicants(institution)?
        .into_iter()
        .find(|applicant| &applicant.id == id)
        .ok_or_else(|| AppError::from(AdmissionError::ApplicantNotFound(ApplicationId(id.0.clone()))))
}

/// First waitlisted child past order 2 whose age fits the freed class.
fn pick_out_of_order(
    waitlisted: &[WaitlistedApplicant],
    repository: &InMemoryAdmissionRepository,
    institution: &InstitutionId,
    freed: Option<&ClassRoom>,
    today: NaiveDate,
) -> Result<Option<Applicant>, AppError> {
    let Some(freed) = freed else {
        return Ok(None);
    };
    let applicants = repository.applicants(institution)?;

    let candidate = waitlisted
        .iter()
        .filter(|entry| entry.reason != WaitlistReason::NoEligibleAgeBand)
        .filter_map(|entry| {
            applicants
                .iter()
                .find(|applicant| applicant.id == entry.participant_id)
        })
        .filter(|applicant| applicant.waitlist_order.is_some_and(|order| order >= 3))
        .find(|applicant| {
            applicant
                .birth_date
                .is_some_and(|born| freed.covers_age(age_in_years(born, today)))
        })
        .cloned();
    Ok(candidate)
}

fn render_lottery(result: &LotteryResult) {
    println!("  {}", result.message);
    println!("  Tier       legal  effective  pool  drawn  admitted  waitlisted");
    for tier in &result.counts_by_tier {
        println!(
            "  {:<9} {:>6} {:>10} {:>5} {:>6} {:>9} {:>11}",
            tier.tier.label(),
            tier.legal_quota,
            tier.effective_quota,
            tier.pool,
            tier.drawn,
            tier.admitted,
            tier.waitlisted
        );
    }
    println!("  Admitted:");
    for accepted in &result.accepted {
        println!(
            "    #{:<3} {} -> {} ({}, drawn in {})",
            accepted.draw_sequence,
            accepted.participant_id,
            accepted.class_id,
            accepted.tier.label(),
            accepted.drawn_in.label()
        );
    }
    println!("  Waitlist:");
    for waitlisted in &result.waitlisted {
        println!(
            "    order {:<3} {} ({}, {})",
            waitlisted.waitlist_order,
            waitlisted.participant_id,
            waitlisted.tier.label(),
            waitlisted.reason.label()
        );
    }
}

fn render_waitlist(applicants: &[Applicant]) {
    let mut ordered: Vec<&Applicant> = applicants
        .iter()
        .filter(|applicant| applicant.waitlist_order.is_some())
        .collect();
    ordered.sort_by_key(|applicant| applicant.waitlist_order);
    for applicant in ordered {
        if let Some(order) = applicant.waitlist_order {
            println!("    order {:<3} {}", order, applicant.id);
        }
    }
}

fn render_statistics(statistics: &InstitutionStatistics) {
    println!(
        "  Capacity {} | enrolled {} | available {}",
        statistics.capacity.capacity,
        statistics.capacity.enrolled,
        statistics.capacity.available()
    );
    for tier in &statistics.per_tier_counts {
        let quota = statistics.per_tier_quota.get(tier.tier);
        println!(
            "  {}: {} applicants, {} admitted, {} waitlisted (quota {} legal / {} effective)",
            tier.tier.label(),
            tier.applicants,
            tier.admitted,
            tier.waitlisted,
            quota.legal,
            quota.effective
        );
    }
    for class in &statistics.class_info {
        println!(
            "  {} {} (ages {}-{}): {}/{} seats taken",
            class.class_id, class.name, class.min_age, class.max_age, class.enrolled, class.capacity
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_institution_mixes_children_and_parents() {
        let repository = InMemoryAdmissionRepository::default();
        seed_demo_institution(&repository).expect("seeded");
        let institution = InstitutionId(DEMO_INSTITUTION.to_string());

        let applicants = repository.applicants(&institution).expect("readable");
        let children = applicants
            .iter()
            .filter(|applicant| applicant.role == Some(ParticipantRole::Child))
            .count();
        assert_eq!(children, 18);
        assert_eq!(applicants.len(), 24);
        assert!(applicants.iter().all(|applicant| applicant.birth_date.is_some()));
    }

    #[test]
    fn demo_walkthrough_completes() {
        run_demo(DemoArgs::default()).expect("demo runs");
    }
}
