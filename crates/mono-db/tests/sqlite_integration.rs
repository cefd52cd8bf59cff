use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;

use mono_db::{
    ActivityFilter, AnalyticsService, ApiLogFilter, ApplicationLog, ApplicationLogFilter,
    AuditLogService, ConnectionProfile, ConnectionRegistry, CursorCodec, CursorPager,
    DatabaseRole, DatabaseSettings, DbError, ItemFilter, ItemPatch, ItemService, ItemSort, ItemViewFilter,
    LogLevel, NewApiLog, NewApplicationLog, NewItem, NewItemView, NewUser, NewUserActivity,
    PageRequest, PasswordHasher, PoolSettings, UserFilter, UserPatch, UserService,
};

const SECRET: &[u8] = b"integration-secret";

struct Harness {
    _dir: TempDir,
    registry: ConnectionRegistry,
    codec: CursorCodec,
    items: ItemService,
    users: UserService,
    analytics: AnalyticsService,
    audit: AuditLogService,
}

fn sqlite_profile(dir: &TempDir, role: DatabaseRole, pool: PoolSettings) -> ConnectionProfile {
    let path = dir.path().join(format!("{role}.db"));
    ConnectionProfile::from_dsn(role, format!("sqlite://{}?mode=rwc", path.display())).with_pool(pool)
}

fn test_pool() -> PoolSettings {
    PoolSettings {
        pool_size: 1,
        max_overflow: 3,
        pool_timeout: Duration::from_secs(5),
        pool_recycle: Duration::from_secs(3600),
    }
}

async fn setup_with_pool(pool: PoolSettings) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let settings = DatabaseSettings {
        main: sqlite_profile(&dir, DatabaseRole::Main, pool),
        analytics: sqlite_profile(&dir, DatabaseRole::Analytics, pool),
        logs: sqlite_profile(&dir, DatabaseRole::Logs, pool),
    };
    let registry = ConnectionRegistry::connect(&settings).await.unwrap();
    registry.bootstrap_schema().await.unwrap();

    let codec = CursorCodec::new(SECRET).unwrap();
    let pager = CursorPager::new(codec.clone());
    let audit = AuditLogService::new(registry.logs().clone(), pager.clone());
    let items = ItemService::new(registry.main().clone(), pager.clone(), audit.clone());
    let users = UserService::new(registry.main().clone(), pager.clone(), audit.clone())
        .with_password_hasher(PasswordHasher::with_iterations(1_000));
    let analytics = AnalyticsService::new(registry.analytics().clone(), pager, audit.clone());

    Harness {
        _dir: dir,
        registry,
        codec,
        items,
        users,
        analytics,
        audit,
    }
}

async fn setup() -> Harness {
    setup_with_pool(test_pool()).await
}

fn new_user(email: &str, username: &str) -> NewUser {
    NewUser {
        email: email.into(),
        username: username.into(),
        full_name: None,
        password: "password123".into(),
    }
}

/// Audit entries from the services are written in the background.
async fn wait_for_application_logs(
    h: &Harness,
    logger: &str,
    expected: usize,
) -> Result<Vec<ApplicationLog>> {
    let filter = ApplicationLogFilter {
        level: None,
        logger_name: Some(logger.into()),
    };
    for _ in 0..100 {
        let page = h
            .audit
            .list_application_logs(&filter, &PageRequest::default())
            .await?;
        if page.items.len() >= expected {
            return Ok(page.items);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    anyhow::bail!("expected {expected} {logger} log entries")
}

async fn seed_items(h: &Harness, names: impl IntoIterator<Item = String>) -> Vec<i64> {
    let mut ids = Vec::new();
    for name in names {
        ids.push(h.items.create(NewItem::new(name)).await.unwrap().id);
    }
    ids
}

#[tokio::test]
async fn schema_bootstrap_is_idempotent() -> Result<()> {
    let h = setup().await;
    h.registry.bootstrap_schema().await?;
    for (role, health) in h.registry.health().await {
        assert!(health.is_ok(), "{role} unhealthy");
    }
    Ok(())
}

#[tokio::test]
async fn connect_fails_fast_on_unreachable_database() {
    let dir = tempfile::tempdir().unwrap();
    let settings = DatabaseSettings {
        main: sqlite_profile(&dir, DatabaseRole::Main, test_pool()),
        analytics: ConnectionProfile::from_dsn(
            DatabaseRole::Analytics,
            "sqlite:///definitely/missing/dir/analytics.db",
        ),
        logs: sqlite_profile(&dir, DatabaseRole::Logs, test_pool()),
    };
    let err = ConnectionRegistry::connect(&settings).await.unwrap_err();
    assert!(format!("{err:#}").contains("analytics"));
}

#[tokio::test]
async fn connect_rejects_incomplete_profile() {
    let dir = tempfile::tempdir().unwrap();
    let mut main = ConnectionProfile::mysql(DatabaseRole::Main, "localhost", 3306, "root", "", "");
    main.database.clear();
    let settings = DatabaseSettings {
        main,
        analytics: sqlite_profile(&dir, DatabaseRole::Analytics, test_pool()),
        logs: sqlite_profile(&dir, DatabaseRole::Logs, test_pool()),
    };
    let err = ConnectionRegistry::connect(&settings).await.unwrap_err();
    assert!(format!("{err:#}").contains("database"));
}

#[tokio::test]
async fn inserts_report_the_new_row_id() -> Result<()> {
    let h = setup().await;

    let first = h.items.create(NewItem::new("first")).await?;
    let second = h.items.create(NewItem::new("second")).await?;
    assert!(first.id > 0);
    assert_eq!(second.id, first.id + 1);
    assert_eq!(h.items.get(second.id).await?.name, "second");

    let user = h.users.create(new_user("ids@example.com", "ids")).await?;
    assert_eq!(h.users.get(user.id).await?.username, "ids");

    let activity = h
        .analytics
        .log_user_activity(NewUserActivity::new(user.id, "login"))
        .await?;
    assert!(activity.id > 0);
    let view = h
        .analytics
        .log_item_view(NewItemView {
            item_id: first.id,
            user_id: Some(user.id),
        })
        .await?;
    assert_eq!(view.view_count, 1);

    let app_log = h
        .audit
        .record_application(NewApplicationLog::new(LogLevel::Info, "ids", "one"))
        .await?;
    let next_log = h
        .audit
        .record_application(NewApplicationLog::new(LogLevel::Info, "ids", "two"))
        .await?;
    assert!(next_log.id > app_log.id);
    assert_eq!(next_log.message, "two");

    let api_log = h
        .audit
        .record_api_request(NewApiLog {
            method: "POST".into(),
            endpoint: "/api/v1/items".into(),
            status_code: 201,
            ..NewApiLog::default()
        })
        .await?;
    assert!(api_log.id > 0);
    assert_eq!(api_log.status_code, 201);
    Ok(())
}

#[tokio::test]
async fn twenty_five_items_page_as_twenty_then_five() -> Result<()> {
    let h = setup().await;
    let ids = seed_items(&h, (1..=25).map(|n| format!("item {n:02}"))).await;

    let first = h
        .items
        .list(&ItemFilter::default(), &PageRequest::first(20))
        .await?;
    assert_eq!(first.items.len(), 20);
    assert!(first.has_more);
    let token = first.next_cursor.clone().expect("cursor for the 20th row");
    assert_eq!(h.codec.decode(&token)?.id, ids[19]);

    let second = h
        .items
        .list(&ItemFilter::default(), &PageRequest::after(20, token))
        .await?;
    assert_eq!(second.items.len(), 5);
    assert!(!second.has_more);
    assert_eq!(second.next_cursor, None);
    assert_eq!(
        second.items.iter().map(|i| i.id).collect::<Vec<_>>(),
        ids[20..].to_vec()
    );
    Ok(())
}

#[tokio::test]
async fn every_limit_visits_every_row_once_in_key_order() -> Result<()> {
    let h = setup().await;
    let names = ["delta", "alpha", "charlie", "alpha", "bravo", "delta", "echo"];
    let ids = seed_items(&h, (0..45).map(|n| names[n % names.len()].to_string())).await;

    let mut by_name: Vec<(String, i64)> = ids
        .iter()
        .enumerate()
        .map(|(n, id)| (names[n % names.len()].to_string(), *id))
        .collect();
    by_name.sort();
    let expected_by_name: Vec<i64> = by_name.into_iter().map(|(_, id)| id).collect();

    for (sort, expected) in [(ItemSort::Id, ids.clone()), (ItemSort::Name, expected_by_name)] {
        let filter = ItemFilter { q: None, sort };
        for limit in 1..=100_i64 {
            let mut seen = Vec::new();
            let mut request = PageRequest::first(limit);
            loop {
                let page = h.items.list(&filter, &request).await?;
                assert!(page.items.len() as i64 <= limit);
                assert_eq!(page.has_more, page.next_cursor.is_some());
                seen.extend(page.items.iter().map(|i| i.id));
                match page.next_cursor {
                    Some(cursor) => request = PageRequest::after(limit, cursor),
                    None => break,
                }
            }
            assert_eq!(seen, expected, "sort {sort:?} limit {limit}");
        }
    }
    Ok(())
}

#[tokio::test]
async fn same_cursor_returns_same_page() -> Result<()> {
    let h = setup().await;
    seed_items(&h, (1..=9).map(|n| format!("n{n}"))).await;

    let first = h
        .items
        .list(&ItemFilter::default(), &PageRequest::first(4))
        .await?;
    let request = PageRequest::after(4, first.next_cursor.unwrap());
    let again = h.items.list(&ItemFilter::default(), &request).await?;
    let once_more = h.items.list(&ItemFilter::default(), &request).await?;
    assert_eq!(again, once_more);
    Ok(())
}

#[tokio::test]
async fn tampered_and_foreign_cursors_are_validation_errors() -> Result<()> {
    let h = setup().await;
    seed_items(&h, (1..=3).map(|n| format!("n{n}"))).await;
    let page = h
        .items
        .list(&ItemFilter::default(), &PageRequest::first(1))
        .await?;
    let token = page.next_cursor.unwrap();

    let mut tampered = token.clone().into_bytes();
    tampered[2] = if tampered[2] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(tampered)?;

    for bad in [tampered, "not-a-cursor".to_string(), format!("{token}x")] {
        let err = h
            .items
            .list(&ItemFilter::default(), &PageRequest::after(1, bad))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)), "{err:?}");
    }

    let by_name = ItemFilter {
        q: None,
        sort: ItemSort::Name,
    };
    let err = h
        .items
        .list(&by_name, &PageRequest::after(1, token))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Validation(_)));
    Ok(())
}

#[tokio::test]
async fn non_positive_limit_is_rejected_and_large_limit_clamped() -> Result<()> {
    let h = setup().await;
    seed_items(&h, (1..=3).map(|n| format!("n{n}"))).await;

    for limit in [0, -1] {
        let err = h
            .items
            .list(&ItemFilter::default(), &PageRequest::first(limit))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }
    let page = h
        .items
        .list(&ItemFilter::default(), &PageRequest::first(1_000))
        .await?;
    assert_eq!(page.limit, 100);
    assert_eq!(page.items.len(), 3);
    Ok(())
}

#[tokio::test]
async fn item_crud_with_soft_delete() -> Result<()> {
    let h = setup().await;
    let created = h
        .items
        .create(NewItem::new("  Lamp ").with_description("desk lamp"))
        .await?;
    assert_eq!(created.name, "Lamp");
    assert!(created.is_active);
    assert_eq!(created.updated_at, None);

    let updated = h
        .items
        .update(
            created.id,
            ItemPatch {
                name: None,
                description: Some(None),
            },
        )
        .await?;
    assert_eq!(updated.name, "Lamp");
    assert_eq!(updated.description, None);
    assert!(updated.updated_at.is_some());

    h.items.delete(created.id).await?;
    assert!(matches!(
        h.items.get(created.id).await,
        Err(DbError::NotFound { resource: "item", .. })
    ));
    assert!(matches!(
        h.items.delete(created.id).await,
        Err(DbError::NotFound { .. })
    ));
    let page = h
        .items
        .list(&ItemFilter::default(), &PageRequest::default())
        .await?;
    assert!(page.items.is_empty());
    Ok(())
}

#[tokio::test]
async fn item_search_is_case_insensitive_and_literal() -> Result<()> {
    let h = setup().await;
    seed_items(
        &h,
        ["Red Chair", "red table", "Blue chair", "100% wool"].map(String::from),
    )
    .await;

    let search = |q: &str| ItemFilter {
        q: Some(q.to_string()),
        sort: ItemSort::Name,
    };
    let chairs = h.items.list(&search("CHAIR"), &PageRequest::default()).await?;
    assert_eq!(
        chairs.items.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
        ["Blue chair", "Red Chair"]
    );
    let percent = h.items.list(&search("0%"), &PageRequest::default()).await?;
    assert_eq!(percent.items.len(), 1);
    let underscore = h.items.list(&search("_"), &PageRequest::default()).await?;
    assert!(underscore.items.is_empty());
    Ok(())
}

#[tokio::test]
async fn duplicate_email_conflicts_without_partial_row() -> Result<()> {
    let h = setup().await;
    let first = h.users.create(new_user("ada@example.com", "ada")).await?;

    let err = h
        .users
        .create(new_user("ada@example.com", "lovelace"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::Conflict {
            field: "email",
            ..
        }
    ));
    let err = h
        .users
        .create(new_user("other@example.com", "ada"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::Conflict {
            field: "username",
            ..
        }
    ));

    assert_eq!(h.users.get(first.id).await?.email, "ada@example.com");
    let all = h
        .users
        .list(
            UserFilter {
                include_inactive: true,
            },
            &PageRequest::default(),
        )
        .await?;
    assert_eq!(all.items.len(), 1);

    let stats = h.registry.main().stats();
    assert!(stats.rolled_back >= 2);
    assert_eq!(stats.in_flight(), 0);
    Ok(())
}

#[tokio::test]
async fn deleted_user_stays_for_history() -> Result<()> {
    let h = setup().await;
    let keep = h.users.create(new_user("keep@example.com", "keep")).await?;
    let gone = h.users.create(new_user("gone@example.com", "gone")).await?;

    h.users.delete(gone.id).await?;
    assert!(matches!(
        h.users.get(gone.id).await,
        Err(DbError::NotFound { resource: "user", .. })
    ));
    let history = h.users.find_any(gone.id).await?;
    assert!(!history.is_active);
    assert_eq!(history.email, "gone@example.com");

    let active = h.users.list(UserFilter::default(), &PageRequest::default()).await?;
    assert_eq!(active.items.iter().map(|u| u.id).collect::<Vec<_>>(), [keep.id]);
    let everyone = h
        .users
        .list(
            UserFilter {
                include_inactive: true,
            },
            &PageRequest::default(),
        )
        .await?;
    assert_eq!(everyone.items.len(), 2);

    let restored = h.users.set_active(gone.id, true).await?;
    assert!(restored.is_active);
    assert_eq!(h.users.get(gone.id).await?.id, gone.id);
    Ok(())
}

#[tokio::test]
async fn user_update_enforces_uniqueness_and_rehashes() -> Result<()> {
    let h = setup().await;
    let ada = h.users.create(new_user("ada@example.com", "ada")).await?;
    h.users.create(new_user("bob@example.com", "bob")).await?;

    let err = h
        .users
        .update(
            ada.id,
            UserPatch {
                email: Some("bob@example.com".into()),
                ..UserPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Conflict { field: "email", .. }));

    let same_email = h
        .users
        .update(
            ada.id,
            UserPatch {
                email: Some("ada@example.com".into()),
                full_name: Some(Some("Ada L".into())),
                password: Some("new-password".into()),
                ..UserPatch::default()
            },
        )
        .await?;
    assert_eq!(same_email.full_name.as_deref(), Some("Ada L"));
    assert!(h.users.verify_password(&same_email, "new-password"));
    assert!(!h.users.verify_password(&same_email, "password123"));

    let admin = h.users.set_superuser(ada.id, true).await?;
    assert!(admin.is_superuser);
    assert!(!h.users.set_superuser(ada.id, false).await?.is_superuser);
    Ok(())
}

#[tokio::test]
async fn invalid_user_input_never_reaches_the_database() -> Result<()> {
    let h = setup().await;
    let before = h.registry.main().stats();
    let err = h
        .users
        .create(NewUser {
            email: "nope".into(),
            username: "has space".into(),
            full_name: None,
            password: "short".into(),
        })
        .await
        .unwrap_err();
    match err {
        DbError::Validation(err) => assert_eq!(err.violations.len(), 3),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(h.registry.main().stats().acquired, before.acquired);
    Ok(())
}

#[tokio::test]
async fn failed_operation_rolls_back_its_writes() -> Result<()> {
    let h = setup().await;
    let provider = h.registry.main();

    let mut session = provider.acquire().await?;
    sqlx::query(
        "INSERT INTO items (name, description, is_active, created_at) \
         VALUES ('ghost', NULL, 1, '2024-01-01T00:00:00.000000Z')",
    )
    .execute(session.conn())
    .await?;
    let outcome: Result<(), DbError> = session
        .finish(Err(DbError::not_found("item", 0)))
        .await;
    assert!(outcome.is_err());

    let page = h
        .items
        .list(&ItemFilter::default(), &PageRequest::default())
        .await?;
    assert!(page.items.is_empty());

    let stats = provider.stats();
    assert_eq!(stats.acquired, stats.released);
    assert!(stats.rolled_back >= 1);
    Ok(())
}

#[tokio::test]
async fn cancelled_operation_releases_its_session() -> Result<()> {
    let h = setup_with_pool(PoolSettings {
        pool_size: 1,
        max_overflow: 0,
        ..test_pool()
    })
    .await;
    let provider = h.registry.main().clone();

    let stalled = async move {
        let mut session = provider.acquire().await.unwrap();
        sqlx::query(
            "INSERT INTO items (name, description, is_active, created_at) \
             VALUES ('stalled', NULL, 1, '2024-01-01T00:00:00.000000Z')",
        )
        .execute(session.conn())
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        session.commit().await
    };
    assert!(tokio::time::timeout(Duration::from_millis(200), stalled)
        .await
        .is_err());

    let stats = h.registry.main().stats();
    assert_eq!(stats.abandoned, 1);
    assert_eq!(stats.in_flight(), 0);

    // The single pooled connection must be usable again and the write gone.
    let page = h
        .items
        .list(&ItemFilter::default(), &PageRequest::default())
        .await?;
    assert!(page.items.is_empty());
    h.items.create(NewItem::new("after cancel")).await?;
    Ok(())
}

#[tokio::test]
async fn exhausted_pool_times_out() -> Result<()> {
    let h = setup_with_pool(PoolSettings {
        pool_size: 1,
        max_overflow: 0,
        pool_timeout: Duration::from_millis(200),
        pool_recycle: Duration::from_secs(3600),
    })
    .await;

    let held = h.registry.main().acquire().await?;
    let err = h.items.get(1).await.unwrap_err();
    assert!(matches!(
        err,
        DbError::PoolTimeout {
            role: DatabaseRole::Main
        }
    ));
    held.rollback().await?;

    assert!(matches!(h.items.get(1).await, Err(DbError::NotFound { .. })));
    Ok(())
}

#[tokio::test]
async fn secondary_log_write_failure_keeps_primary_write() -> Result<()> {
    let h = setup().await;
    h.registry.logs().close().await;

    let item = h.items.create(NewItem::new("survivor")).await?;
    assert_eq!(h.items.get(item.id).await?.name, "survivor");
    Ok(())
}

#[tokio::test]
async fn mutations_leave_application_log_entries() -> Result<()> {
    let h = setup().await;
    let item = h.items.create(NewItem::new("logged")).await?;
    h.items.delete(item.id).await?;

    let logs = wait_for_application_logs(&h, "items", 2).await?;
    let mut messages: Vec<_> = logs.into_iter().map(|l| l.message).collect();
    messages.sort();
    assert_eq!(
        messages,
        [
            format!("item {} created", item.id),
            format!("item {} deleted", item.id)
        ]
    );
    Ok(())
}

#[tokio::test]
async fn mutation_does_not_wait_for_an_exhausted_logs_pool() -> Result<()> {
    let h = setup_with_pool(PoolSettings {
        pool_size: 1,
        max_overflow: 0,
        pool_timeout: Duration::from_secs(2),
        pool_recycle: Duration::from_secs(3600),
    })
    .await;
    let held = h.registry.logs().acquire().await?;

    let started = std::time::Instant::now();
    let item = h.items.create(NewItem::new("prompt")).await?;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(h.items.get(item.id).await?.name, "prompt");

    held.rollback().await?;
    Ok(())
}

#[tokio::test]
async fn item_views_accumulate_per_viewer() -> Result<()> {
    let h = setup().await;
    for viewer in [Some(1), Some(1), None, Some(2), None] {
        h.analytics
            .log_item_view(NewItemView {
                item_id: 10,
                user_id: viewer,
            })
            .await?;
    }
    let repeat = h
        .analytics
        .log_item_view(NewItemView {
            item_id: 10,
            user_id: Some(1),
        })
        .await?;
    assert_eq!(repeat.view_count, 3);
    h.analytics
        .log_item_view(NewItemView {
            item_id: 20,
            user_id: Some(1),
        })
        .await?;

    let popular = h.analytics.popular_items(None).await?;
    assert_eq!(popular[0].item_id, 10);
    assert_eq!(popular[0].total_views, 6);
    assert_eq!(popular[0].unique_views, 3);
    assert_eq!(popular[1].item_id, 20);

    let views = h
        .analytics
        .list_item_views(ItemViewFilter { item_id: Some(10) }, &PageRequest::first(2))
        .await?;
    assert_eq!(views.items.len(), 2);
    assert!(views.has_more);
    let rest = h
        .analytics
        .list_item_views(
            ItemViewFilter { item_id: Some(10) },
            &PageRequest::after(2, views.next_cursor.unwrap()),
        )
        .await?;
    assert_eq!(rest.items.len(), 1);
    assert_eq!(views.items[0].user_id, Some(1));

    let summary = h.analytics.summary().await?;
    assert_eq!(summary.total_item_views, 7);
    assert_eq!(summary.total_user_activities, 0);
    assert_eq!(summary.top_popular_items.len(), 2);
    Ok(())
}

#[tokio::test]
async fn user_activities_page_newest_first() -> Result<()> {
    let h = setup().await;
    for action in ["login", "view", "logout"] {
        h.analytics
            .log_user_activity(NewUserActivity {
                page_url: Some("/dashboard".into()),
                session_duration: Some(30),
                ..NewUserActivity::new(7, action)
            })
            .await?;
    }
    h.analytics
        .log_user_activity(NewUserActivity::new(8, "login"))
        .await?;

    let page = h
        .analytics
        .list_user_activities(ActivityFilter { user_id: Some(7) }, &PageRequest::default())
        .await?;
    assert_eq!(
        page.items.iter().map(|a| a.action.as_str()).collect::<Vec<_>>(),
        ["logout", "view", "login"]
    );
    assert!(h.analytics.popular_items(Some(0)).await.is_err());
    Ok(())
}

#[tokio::test]
async fn audit_log_queries() -> Result<()> {
    let h = setup().await;
    for level in [LogLevel::Info, LogLevel::Error, LogLevel::Critical, LogLevel::Warning] {
        h.audit
            .record_application(
                NewApplicationLog::new(level, "worker", format!("{level} event"))
                    .stack_trace("trace"),
            )
            .await?;
    }
    for (status, ms) in [(200, 15), (500, 2_400), (200, 1_200), (404, 900)] {
        h.audit
            .record_api_request(NewApiLog {
                method: "get".into(),
                endpoint: "/api/v1/items".into(),
                status_code: status,
                response_time_ms: Some(ms),
                ..NewApiLog::default()
            })
            .await?;
    }

    let errors = h.audit.error_logs(&PageRequest::default()).await?;
    assert_eq!(
        errors.items.iter().map(|l| l.level).collect::<Vec<_>>(),
        [LogLevel::Critical, LogLevel::Error]
    );

    let warnings = h
        .audit
        .list_application_logs(
            &ApplicationLogFilter {
                level: Some(LogLevel::Warning),
                logger_name: None,
            },
            &PageRequest::default(),
        )
        .await?;
    assert_eq!(warnings.items.len(), 1);

    let slow = h.audit.slow_requests(1_000, &PageRequest::first(1)).await?;
    assert_eq!(slow.items[0].response_time_ms, Some(2_400));
    assert_eq!(slow.items[0].method, "GET");
    let slower = h
        .audit
        .slow_requests(1_000, &PageRequest::after(1, slow.next_cursor.unwrap()))
        .await?;
    assert_eq!(slower.items[0].response_time_ms, Some(1_200));
    assert!(!slower.has_more);

    let ok = h
        .audit
        .list_api_logs(
            &ApiLogFilter {
                method: Some("GET".into()),
                status_code: Some(200),
                user_id: None,
            },
            &PageRequest::default(),
        )
        .await?;
    assert_eq!(ok.items.len(), 2);
    assert!(h.audit.slow_requests(-1, &PageRequest::default()).await.is_err());
    Ok(())
}
