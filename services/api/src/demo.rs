use crate::infra::demo_store;
use chrono::{Duration, NaiveDate, NaiveTime};
use clap::Args;
use fire_inspect::error::AppError;
use fire_inspect::workflows::inspections::schedule::{parse_date, parse_time_of_day};
use fire_inspect::workflows::inspections::{
    ApplicationId, Clock, EligibleInspectors, EstablishmentId, FixedClock,
    InMemoryNotificationPublisher, InMemorySchedulingStore, Inspection, InspectionFilter,
    InspectionId, InspectionScheduler, InspectorId, RetryPolicy, ScheduleRequest,
    SchedulingError, SystemClock,
};
use std::sync::Arc;

type DemoScheduler = InspectionScheduler<InMemorySchedulingStore, InMemoryNotificationPublisher>;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Date the demo treats as today (YYYY-MM-DD). Defaults to the current date in UTC+8.
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Slot start time for the walkthrough (HH:MM or h:MM AM/PM)
    #[arg(long, default_value = "09:00", value_parser = parse_time_of_day)]
    pub(crate) start: NaiveTime,
    /// Slot end time for the walkthrough
    #[arg(long, default_value = "10:00", value_parser = parse_time_of_day)]
    pub(crate) end: NaiveTime,
    /// Skip the establishment registration portion of the demo.
    #[arg(long)]
    pub(crate) skip_registration: bool,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let today = args.today.unwrap_or_else(|| SystemClock.today());
    let store = demo_store(today, args.start, args.end).map_err(SchedulingError::from)?;
    let notices = Arc::new(InMemoryNotificationPublisher::default());
    let scheduler = InspectionScheduler::with_parts(
        Arc::new(store),
        Arc::clone(&notices),
        Arc::new(FixedClock::on(today)),
        RetryPolicy::default(),
    );

    println!("Fire inspection scheduling demo");
    println!("Today: {today} (UTC+8)");

    print_inspections(&scheduler, "Working set on first read").await?;

    let (application, inspection) = scheduler
        .synchronizer()
        .approve_application(&ApplicationId::new("app-1002"))
        .await?;
    println!(
        "\nApproved application {} ({})",
        application.id,
        application.status.label()
    );
    let Some(inspection) = inspection else {
        println!("  No inspection required for this application type.");
        return Ok(());
    };
    println!("  Pending inspection surfaced as {}", inspection.id);

    let day = today + Duration::days(1);
    let eligible = scheduler
        .eligible_inspectors(day, args.start, args.end)
        .await?;
    println!(
        "\nEligible inspectors for {day} {} - {}:",
        args.start.format("%H:%M"),
        args.end.format("%H:%M")
    );
    let chosen = match &eligible {
        EligibleInspectors::Available(inspectors) => {
            for inspector in inspectors {
                println!("  - {} ({})", inspector.name, inspector.id);
            }
            inspectors[0].id.clone()
        }
        EligibleInspectors::NoneEligible => {
            println!("  none eligible; nothing to schedule");
            return Ok(());
        }
    };

    let scheduled = scheduler
        .schedule_and_assign(
            &inspection.id,
            ScheduleRequest::new(day, args.start, args.end, chosen.clone()),
        )
        .await?;
    print_inspection("Scheduled", &scheduled);

    demo_conflict(&scheduler, day, &args, &chosen).await?;

    let visited = scheduler.complete_inspection(&scheduled.id).await?;
    print_inspection("Inspected", &visited);

    let rejected = scheduler
        .reject(
            &visited.id,
            vec!["Fire extinguisher past service date".to_string()],
            "replace unit near kitchen exit",
        )
        .await?;
    print_inspection("Rejected", &rejected);

    let reopened = scheduler.request_reinspection(&rejected.id).await?;
    print_inspection("Re-inspection requested", &reopened);

    let follow_up = day + Duration::days(7);
    let rescheduled = scheduler
        .schedule_and_assign(
            &reopened.id,
            ScheduleRequest::new(follow_up, args.start, args.end, chosen),
        )
        .await?;
    print_inspection("Rescheduled", &rescheduled);

    scheduler.complete_inspection(&rescheduled.id).await?;
    let approved = scheduler
        .approve(
            &rescheduled.id,
            format!("https://certificates.example/{}.pdf", rescheduled.id),
        )
        .await?;
    print_inspection("Approved", &approved);

    println!("\nHistory for {}:", approved.id);
    for event in scheduler.inspection_history(&approved.id).await? {
        println!(
            "  {} {} -> {}{}",
            event.at.format("%Y-%m-%d %H:%M"),
            event.from,
            event.to,
            event
                .detail
                .map(|detail| format!(" ({detail})"))
                .unwrap_or_default()
        );
    }

    if !args.skip_registration {
        demo_registration(&scheduler).await?;
    }

    // Notices are dispatched on spawned tasks.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let sent = notices.notices().await;
    println!("\nNotifications queued: {}", sent.len());
    for notice in sent {
        println!(
            "  [{}] to {} about {}",
            notice.template, notice.recipient, notice.inspection_id
        );
    }

    Ok(())
}

async fn demo_conflict(
    scheduler: &DemoScheduler,
    day: NaiveDate,
    args: &DemoArgs,
    inspector_id: &InspectorId,
) -> Result<(), AppError> {
    let competing = InspectionId::for_application(&ApplicationId::new("app-1001"));
    let overlapping_start = args.start + Duration::minutes(30);
    let overlapping_end = args.end + Duration::minutes(30);
    let attempt = scheduler
        .schedule_and_assign(
            &competing,
            ScheduleRequest::new(
                day,
                overlapping_start,
                overlapping_end,
                inspector_id.clone(),
            ),
        )
        .await;

    match attempt {
        Err(err @ SchedulingError::Conflict { .. }) => {
            println!("\nOverlapping booking for {competing} refused: {err}");
            Ok(())
        }
        Err(err) => Err(err.into()),
        Ok(inspection) => {
            print_inspection("Unexpectedly booked", &inspection);
            Ok(())
        }
    }
}

async fn demo_registration(scheduler: &DemoScheduler) -> Result<(), AppError> {
    let synchronizer = scheduler.synchronizer();
    let id = EstablishmentId::new("est-print");

    println!("\nEstablishment registration review");
    let bounced = synchronizer
        .reject_establishment(
            &id,
            vec!["Missing business permit".to_string()],
            "upload the current year's permit".to_string(),
        )
        .await?;
    println!("  {} is now {}", bounced.name, bounced.status.label());

    synchronizer.pre_register(&id).await?;
    let registered = synchronizer.approve_establishment(&id).await?;
    println!(
        "  {} resubmitted and is now {}",
        registered.name,
        registered.status.label()
    );

    for entry in synchronizer.rejection_history(&id).await? {
        println!(
            "  rejected {}: {}",
            entry.timestamp.format("%Y-%m-%d"),
            entry.reasons.join("; ")
        );
    }
    Ok(())
}

async fn print_inspections(scheduler: &DemoScheduler, title: &str) -> Result<(), AppError> {
    println!("\n{title}:");
    for inspection in scheduler.inspections(&InspectionFilter::default()).await? {
        println!(
            "  {:<16} {:<15} {:<9} {}",
            inspection.id,
            inspection.inspection_type.label(),
            inspection.status,
            inspection.establishment_name
        );
    }
    Ok(())
}

fn print_inspection(title: &str, inspection: &Inspection) {
    let slot = inspection
        .schedule
        .map(|window| {
            format!(
                "{} {} - {}",
                window.date(),
                window.start().format("%H:%M"),
                window.end().format("%H:%M")
            )
        })
        .unwrap_or_else(|| "unscheduled".to_string());
    let inspector = inspection
        .inspector_name
        .as_deref()
        .unwrap_or("unassigned");
    println!(
        "\n{title}: {} [{}] {slot} with {inspector}",
        inspection.id, inspection.status
    );
    if let Some(reason) = inspection.rejection_reason() {
        println!("  reasons: {reason}");
    }
    if let Some(url) = &inspection.certificate_url {
        println!("  certificate: {url}");
    }
}
