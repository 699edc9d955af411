use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use crewplan::engine::NewDay;
use crewplan::model::*;
use crewplan::{Engine, MemoryStore, NotifyHub};

// ── Test infrastructure ──────────────────────────────────────

fn wal_path() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("crewplan_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join("crewplan.wal")
}

fn open_engine(path: &Path) -> (Engine, Arc<NotifyHub>) {
    let store = Arc::new(MemoryStore::open(path).unwrap());
    let hub = Arc::new(NotifyHub::new());
    (Engine::new(store, hub.clone()), hub)
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, day).unwrap()
}

fn shift(day: u32) -> NewDay {
    NewDay {
        date: date(day),
        start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
    }
}

fn project(name: &str, start: u32, end: u32) -> Project {
    Project {
        id: Ulid::new(),
        client_name: name.into(),
        start_date: Some(date(start)),
        end_date: Some(date(end)),
        schedule_status: "planned".into(),
    }
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn staffing_flow_survives_restart() {
    let path = wal_path();
    let crew = Ulid::new();
    let festival = project("Harbour Festival", 2, 6);
    let gala = project("Winter Gala", 5, 5);

    let (assignment, conflict_id, request_id) = {
        let (engine, _hub) = open_engine(&path);
        engine.save_project(festival.clone()).await.unwrap();
        engine.save_project(gala.clone()).await.unwrap();

        let a = engine
            .create_assignment(festival.id, crew, Some(BookingStatus::Tentative), Some("rigging".into()))
            .await
            .unwrap()
            .assignment;
        engine.exclude_dates(a.id, &[date(3)], Some("travel".into())).await.unwrap();
        let report = engine
            .add_days(a.id, (2..=6).map(shift).collect())
            .await
            .unwrap();
        assert_eq!(report.written(), 4);

        let b = engine
            .create_assignment(gala.id, crew, None, None)
            .await
            .unwrap();
        assert_eq!(b.busy_dates.len(), 1);
        let report = engine.add_days(b.assignment.id, vec![shift(5)]).await.unwrap();
        assert_eq!(report.conflicts.len(), 1);

        let request = engine
            .create_confirmation_request(festival.id, &[a.id], "producer@harbour.example", "Sam")
            .await
            .unwrap();
        (a, report.conflicts[0].id, request.id)
    };

    let (engine, _hub) = open_engine(&path);
    let reloaded = engine.assignment(assignment.id).await.unwrap();
    assert_eq!(reloaded.booking_status, BookingStatus::PendingConfirm);
    assert_eq!(reloaded.notes.as_deref(), Some("rigging"));
    assert_eq!(engine.days_for_assignment(assignment.id).await.unwrap().len(), 4);
    assert_eq!(engine.exclusions_for_assignment(assignment.id).await.unwrap().len(), 1);
    assert_eq!(engine.conflicts_for_user(crew, true).await.unwrap()[0].id, conflict_id);

    // The (project, user) pair is still taken after replay.
    assert!(engine.create_assignment(festival.id, crew, None, None).await.is_err());

    let outcome = engine
        .respond_to_confirmation(request_id, ConfirmationResponse::Accept)
        .await
        .unwrap();
    assert_eq!(outcome.outcomes.len(), 1);
    engine.resolve_conflict(conflict_id, "split shift agreed").await.unwrap();
    assert!(engine.conflicts_for_user(crew, true).await.unwrap().is_empty());
}

#[tokio::test]
async fn compaction_keeps_state() {
    let path = wal_path();
    let crew = Ulid::new();
    let site = project("Stadium", 9, 13);

    let assignment_id = {
        let store = Arc::new(MemoryStore::open(&path).unwrap());
        let engine = Engine::new(store.clone(), Arc::new(NotifyHub::new()));
        engine.save_project(site.clone()).await.unwrap();
        let a = engine
            .create_assignment(site.id, crew, Some(BookingStatus::Confirmed), None)
            .await
            .unwrap()
            .assignment;
        let report = engine.add_days(a.id, (9..=13).map(shift).collect()).await.unwrap();
        let first = report.outcomes[0].result.as_ref().unwrap().id;
        engine.remove_days(&[first]).await.unwrap();
        engine.complete_assignment(a.id).await.unwrap();

        assert!(store.wal_appends_since_compact().await > 0);
        store.compact().await.unwrap();
        assert_eq!(store.wal_appends_since_compact().await, 0);
        a.id
    };

    let (engine, _hub) = open_engine(&path);
    let a = engine.assignment(assignment_id).await.unwrap();
    assert_eq!(a.booking_status, BookingStatus::Complete);
    let days = engine.days_for_assignment(assignment_id).await.unwrap();
    assert_eq!(days.len(), 4);
    assert_eq!(days[0].work_date, date(10));
}

#[tokio::test]
async fn cascade_after_restart() {
    let path = wal_path();
    let site = project("Convention", 16, 20);
    let crew: Vec<UserId> = (0..3).map(|_| Ulid::new()).collect();

    {
        let (engine, _hub) = open_engine(&path);
        engine.save_project(site.clone()).await.unwrap();
        for user in &crew {
            engine
                .create_assignment(site.id, *user, Some(BookingStatus::Tentative), None)
                .await
                .unwrap();
        }
    }

    let (engine, hub) = open_engine(&path);
    let mut rx = hub.subscribe();
    let mut plan = engine.cascade_candidates(site.id).await.unwrap();
    assert_eq!(plan.candidates.len(), 3);
    let held_back = plan.candidates[0].id;
    plan.deselect(held_back);

    let report = engine
        .change_project_status(&plan, "confirmed", BookingStatus::Confirmed)
        .await
        .unwrap();
    assert_eq!(report.updated(), 2);

    let mut changed = 0;
    while let Ok(n) = rx.try_recv() {
        assert_eq!(n.template, TemplateKind::AssignmentStatusChanged);
        changed += 1;
    }
    assert_eq!(changed, 2);

    let statuses: Vec<BookingStatus> = engine
        .assignments_for_project(site.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|a| a.id != held_back)
        .map(|a| a.booking_status)
        .collect();
    assert_eq!(statuses, vec![BookingStatus::Confirmed; 2]);
    assert_eq!(engine.project(site.id).await.unwrap().schedule_status, "confirmed");
}
