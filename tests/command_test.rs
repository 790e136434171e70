mod tools;

#[cfg(test)]
mod command_tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    use shift_rotation_lib::{
        application::{commands::*, sync_queue::SyncEvent},
        config::{AppConfig, DatabaseConfig},
        domain::{
            models::*,
            mutation::{Mutation, MutationEnvelope},
        },
        error::{AppError, RemoteError, ScheduleError},
        infrastructure::{
            db,
            remote::{Ack, RemoteAuthority},
        },
        AppServices,
    };

    use crate::tools;

    // ========================================================================
    // 1. Setup
    // ========================================================================

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create memory pool");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        pool
    }

    /// Acknowledges everything, optionally attaching a dataset.
    #[derive(Default)]
    struct AckingRemote {
        dataset: Mutex<Option<Dataset>>,
        received: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RemoteAuthority for AckingRemote {
        async fn submit(&self, envelope: &MutationEnvelope<'_>) -> Result<Ack, RemoteError> {
            self.received.lock().unwrap().push(envelope.entity_type.as_str().to_string());
            Ok(Ack { dataset: self.dataset.lock().unwrap().clone() })
        }

        async fn fetch_dataset(&self) -> Result<Dataset, RemoteError> {
            Ok(self.dataset.lock().unwrap().clone().unwrap_or_default())
        }
    }

    async fn setup_test_services() -> (AppServices, Arc<AckingRemote>) {
        let remote = Arc::new(AckingRemote::default());
        let services = AppServices::new(
            setup_test_db().await,
            &AppConfig::default(),
            Some(remote.clone() as Arc<dyn RemoteAuthority>),
        );
        (services, remote)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn queued(services: &AppServices) -> Vec<Mutation> {
        pending_mutations(services).await.unwrap().into_iter().map(|m| m.mutation).collect()
    }

    // ========================================================================
    // 2. Local write then enqueue
    // ========================================================================

    #[tokio::test]
    async fn test_upsert_enqueues_only_real_changes() {
        let (services, _remote) = setup_test_services().await;

        let person = upsert_person(&services, PersonRecord::new("a01", "Alice", "A")).await.unwrap();
        upsert_person(&services, PersonRecord::new("A01", "Alice", "A")).await.unwrap();

        assert_eq!(queued(&services).await, vec![Mutation::PersonUpsert { person }]);
    }

    #[tokio::test]
    async fn test_failed_local_write_enqueues_nothing() {
        let (services, _remote) = setup_test_services().await;
        upsert_person(&services, PersonRecord::new("A01", "Alice", "A")).await.unwrap();
        let before = queued(&services).await.len();

        let err = set_manual_shift(&services, "A01", date(2025, 11, 3), "X").await.unwrap_err();
        assert!(matches!(err, AppError::Schedule(ScheduleError::Validation(_))));

        let err = upsert_person(&services, PersonRecord::new("B01", "Bob", "Q")).await.unwrap_err();
        assert!(matches!(err, AppError::Schedule(ScheduleError::Validation(_))));

        let err = soft_delete_person(&services, "NOPE").await.unwrap_err();
        assert!(matches!(err, AppError::Schedule(ScheduleError::NotFound(_))));

        assert_eq!(queued(&services).await.len(), before);
    }

    #[tokio::test]
    async fn test_soft_delete_enqueues_once() {
        let (services, _remote) = setup_test_services().await;
        upsert_person(&services, PersonRecord::new("A01", "Alice", "A")).await.unwrap();

        soft_delete_person(&services, "a01").await.unwrap();
        soft_delete_person(&services, "A01").await.unwrap();

        let mutations = queued(&services).await;
        assert_eq!(mutations.len(), 2);
        assert_eq!(mutations[1], Mutation::PersonSoftDelete { code: "A01".to_string() });
    }

    #[tokio::test]
    async fn test_shift_overrides_are_enqueued() {
        let (services, _remote) = setup_test_services().await;
        upsert_person(&services, PersonRecord::new("A01", "Alice", "A")).await.unwrap();
        upsert_person(&services, PersonRecord::new("B01", "Bob", "B")).await.unwrap();
        let day = date(2025, 11, 1);

        record_absence(&services, "A01", date(2025, 11, 5), "c").await.unwrap();
        assert!(swap_shifts(&services, "A01", "B01", day).await.unwrap());

        let overrides: Vec<ShiftAssignment> = queued(&services)
            .await
            .into_iter()
            .filter_map(|m| match m {
                Mutation::ShiftOverride { assignment } => Some(assignment),
                _ => None,
            })
            .collect();
        assert_eq!(overrides.len(), 3);
        assert_eq!(overrides[0].shift_code, ShiftCode::Leave);
        assert_eq!(overrides[1].person_code, "A01");
        assert_eq!(overrides[1].shift_code, ShiftCode::Second);
        assert_eq!(overrides[2].shift_code, ShiftCode::First);
    }

    #[tokio::test]
    async fn test_imports_enqueue_each_change() {
        let (services, _remote) = setup_test_services().await;
        let rows = vec![
            ImportRow { code: "A01".into(), name: "Alice".into(), group: "A".into(), entry_date: None },
            ImportRow { code: "E01".into(), name: "Eve".into(), group: "E".into(), entry_date: Some(date(2025, 12, 1)) },
        ];

        let report = import_people(&services, rows).await.unwrap();
        assert_eq!(report.imported, 2);
        assert_eq!(report.total(), 2);

        let shifts = vec![ImportedShift { person_code: "E01".into(), date: date(2025, 12, 2), shift_code: "M".into() }];
        let report = import_assignments(&services, shifts).await.unwrap();
        assert_eq!(report.imported, 1);

        assert_eq!(queued(&services).await.len(), 3);
    }

    #[tokio::test]
    async fn test_local_write_rolls_back_when_the_log_append_fails() {
        let pool = setup_test_db().await;
        let services = AppServices::new(pool.clone(), &AppConfig::default(), None);
        upsert_person(&services, PersonRecord::new("A01", "Alice", "A")).await.unwrap();

        sqlx::query("DROP TABLE pending_mutations").execute(&pool).await.unwrap();

        let err = upsert_person(&services, PersonRecord::new("B01", "Bob", "B")).await.unwrap_err();
        assert!(matches!(err, AppError::Schedule(ScheduleError::Journal(_))));
        assert!(matches!(
            get_person(&services, "B01").await,
            Err(AppError::Schedule(ScheduleError::NotFound(_)))
        ));

        let day = date(2025, 11, 3);
        assert!(set_manual_shift(&services, "A01", day, "3").await.is_err());
        let row = get_shifts(&services, "A01", day, day).await.unwrap().remove(0);
        assert_eq!(row.origin, ShiftOrigin::Generated);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_queue_follows_commit_order_under_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.database = DatabaseConfig {
            path: dir.path().join("planning.db"),
            max_connections: 5,
            ..Default::default()
        };
        let pool = db::connect(&config.database).await.unwrap();
        let services = Arc::new(AppServices::new(pool, &config, None));
        upsert_person(&services, PersonRecord::new("A01", "Alice", "A")).await.unwrap();
        upsert_person(&services, PersonRecord::new("B01", "Bob", "B")).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..16 {
            let services = services.clone();
            tasks.push(tokio::spawn(async move {
                let rename = PersonRecord {
                    code: "A01".to_string(),
                    name: Some(format!("Alice {i}")),
                    ..Default::default()
                };
                upsert_person(&services, rename).await.unwrap();
                set_manual_shift(&services, "B01", date(2025, 11, 1 + i), "R").await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mutations = queued(&services).await;
        assert_eq!(mutations.len(), 2 + 16 + 16);

        let last_upsert = mutations
            .iter()
            .rev()
            .find_map(|m| match m {
                Mutation::PersonUpsert { person } if person.code == "A01" => Some(person.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_upsert, get_person(&services, "A01").await.unwrap());
    }

    #[tokio::test]
    async fn test_store_writes_announce_enqueued_events() {
        let (services, _remote) = setup_test_services().await;
        let mut events = services.sync.subscribe();

        upsert_person(&services, PersonRecord::new("A01", "Alice", "A")).await.unwrap();

        let sequence = pending_mutations(&services).await.unwrap()[0].sequence;
        assert_eq!(events.recv().await.unwrap(), SyncEvent::Enqueued { sequence });
    }

    #[tokio::test]
    async fn test_leave_periods_are_enqueued() {
        let (services, _remote) = setup_test_services().await;
        upsert_person(&services, PersonRecord::new("A01", "Alice", "A")).await.unwrap();
        let (start, end) = (date(2025, 12, 1), date(2025, 12, 7));

        let written = record_leave_period(&services, "A01", start, end).await.unwrap();
        assert_eq!(written.len(), 7);
        // the Sunday rest row belongs to the leave too
        assert_eq!(clear_leave_period(&services, "A01", start, end).await.unwrap(), 7);
        // nothing left to clear, nothing queued
        assert_eq!(clear_leave_period(&services, "A01", start, end).await.unwrap(), 0);

        let mutations = queued(&services).await;
        assert_eq!(mutations.len(), 1 + 7 + 1);
        assert_eq!(
            mutations.last(),
            Some(&Mutation::LeaveCleared {
                code: "A01".to_string(),
                range: DateRange::new(start, end).unwrap(),
            })
        );

        let err = record_leave_period(&services, "A01", end, start).await.unwrap_err();
        assert!(matches!(err, AppError::Schedule(ScheduleError::Validation(_))));
    }

    // ========================================================================
    // 3. Export and statistics
    // ========================================================================

    #[tokio::test]
    async fn test_monthly_schedule_and_statistics() {
        let (services, _remote) = setup_test_services().await;
        for (code, group) in [("A01", "A"), ("B01", "B"), ("C01", "C"), ("D01", "D"), ("E01", "E"), ("E02", "E")] {
            upsert_person(&services, PersonRecord::new(code, code, group)).await.unwrap();
        }

        let schedule = monthly_schedule(&services, 2025, 11).await.unwrap();
        tools::show_output::show_monthly_schedule_debug_data(&schedule);

        assert_eq!(schedule.people.len(), 6);
        assert!(schedule.people.iter().all(|p| p.days.len() == 30));
        assert_eq!(schedule.shift_of("A01", date(2025, 11, 1)), Some(ShiftCode::First));
        assert_eq!(schedule.shift_of("A01", date(2025, 11, 7)), Some(ShiftCode::Rest));

        let stats = statistics(&services, 11, 2025).await.unwrap();
        tools::show_output::show_stats_debug_data(&stats);

        assert_eq!(stats.total_active_people, 6);
        let total: u32 = stats.counts_by_shift_code.values().sum();
        assert_eq!(total, 6 * 30);
    }

    #[tokio::test]
    async fn test_person_statistics_for_one_month() {
        let (services, _remote) = setup_test_services().await;
        upsert_person(&services, PersonRecord::new("E01", "Eve", "E")).await.unwrap();
        upsert_person(&services, PersonRecord::new("E02", "Enzo", "E")).await.unwrap();

        let stats = person_statistics(&services, "e01", 11, 2025).await.unwrap();
        // 20 weekdays in November 2025, the paired group rests on weekends
        assert_eq!(stats.worked_days, 20);
        assert_eq!(stats.count(ShiftCode::Rest), 10);

        let err = person_statistics(&services, "E01", 13, 2025).await.unwrap_err();
        assert!(matches!(err, AppError::Schedule(ScheduleError::Validation(_))));
    }

    #[tokio::test]
    async fn test_statistics_reject_bad_month() {
        let (services, _remote) = setup_test_services().await;

        for month in [0, 13] {
            let err = statistics(&services, month, 2025).await.unwrap_err();
            assert!(matches!(err, AppError::Schedule(ScheduleError::Validation(_))));
        }
    }

    #[tokio::test]
    async fn test_get_shifts_rejects_reversed_range() {
        let (services, _remote) = setup_test_services().await;
        upsert_person(&services, PersonRecord::new("A01", "Alice", "A")).await.unwrap();

        let err = get_shifts(&services, "A01", date(2025, 11, 5), date(2025, 11, 1)).await.unwrap_err();
        assert!(matches!(err, AppError::Schedule(ScheduleError::Validation(_))));
    }

    // ========================================================================
    // 4. Sync
    // ========================================================================

    #[tokio::test]
    async fn test_manual_sync_delivers_and_adopts_dataset() {
        let (services, remote) = setup_test_services().await;
        upsert_person(&services, PersonRecord::new("A01", "Alice", "A")).await.unwrap();

        let authoritative = Dataset {
            people: vec![Person {
                code: "B07".to_string(),
                name: "Bruno".to_string(),
                group: RotationGroup::B,
                entry_date: date(2025, 11, 1),
                status: PersonStatus::Active,
            }],
            assignments: vec![],
        };
        *remote.dataset.lock().unwrap() = Some(authoritative.clone());

        // offline: nothing moves
        let report = manual_sync(&services).await.unwrap();
        assert!(!report.is_complete());
        assert_eq!(queued(&services).await.len(), 1);

        assert!(set_online(&services, true));
        assert!(services.connectivity.is_online());
        let report = manual_sync(&services).await.unwrap();
        assert_eq!(report.delivered.len(), 1);
        assert_eq!(*remote.received.lock().unwrap(), vec!["person".to_string()]);

        assert_eq!(list_people(&services, true).await.unwrap(), authoritative.people);
    }

    #[tokio::test]
    async fn test_full_resync_needs_connectivity() {
        let (services, _remote) = setup_test_services().await;
        upsert_person(&services, PersonRecord::new("A01", "Alice", "A")).await.unwrap();

        let err = full_resync(&services).await.unwrap_err();
        assert!(matches!(err, AppError::Schedule(ScheduleError::Validation(_))));
        assert_eq!(get_person(&services, "A01").await.unwrap().name, "Alice");

        set_online(&services, true);
        let dataset = full_resync(&services).await.unwrap();
        assert!(dataset.people.is_empty());
        assert!(queued(&services).await.is_empty());
        assert!(list_people(&services, true).await.unwrap().is_empty());
    }
}
