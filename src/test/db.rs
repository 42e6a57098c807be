#[cfg(test)]
mod tests {
    use crate::auth::Role;
    use crate::auth::policy::UserListScope;
    use crate::db::{
        BOOTSTRAP_ADMIN, authenticate_user, create_log, create_user, delete_session, delete_user,
        ensure_bootstrap_admin, escape_like, find_user_by_username, get_session, import_logs,
        insert_qth_entries, last_by_callsign, list_users, search_qth, update_session, update_user,
    };
    use crate::error::AppError;
    use crate::models::{NewLog, NewQthEntry, SessionUpdate, StationDetails, UserUpdate};
    use crate::test::test_utils::{STANDARD_PASSWORD, TestDbBuilder, create_standard_test_db};

    use chrono::{TimeZone, Utc};
    use rocket::tokio;

    fn log_at(callsign: &str, hour: u32, radio: &str) -> NewLog {
        NewLog {
            participant_callsign: callsign.to_string(),
            rst_rcvd: "59".to_string(),
            rst_sent: "59".to_string(),
            station: StationDetails {
                radio: Some(radio.to_string()),
                qth_city: Some("深圳市".to_string()),
                ..Default::default()
            },
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).single(),
        }
    }

    async fn count(pool: &sqlx::SqlitePool, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool)
            .await
            .expect("Failed to count rows")
    }

    #[tokio::test]
    async fn test_create_and_authenticate_user() {
        let test_db = TestDbBuilder::new().build().await.unwrap();
        let pool = &test_db.pool;

        let id = create_user(pool, "bg7xyz", "secret", Some("BG7XYZ"), Role::Operator)
            .await
            .expect("Failed to create user");

        let user = find_user_by_username(pool, "bg7xyz")
            .await
            .unwrap()
            .expect("User should exist");
        assert_eq!(user.id, id);
        assert_eq!(user.role, Role::Operator);
        assert_eq!(user.callsign.as_deref(), Some("BG7XYZ"));

        assert!(authenticate_user(pool, "bg7xyz", "secret").await.unwrap().is_some());
        assert!(authenticate_user(pool, "bg7xyz", "wrong").await.unwrap().is_none());
        assert!(authenticate_user(pool, "nobody", "secret").await.unwrap().is_none());

        let stored_hash: String =
            sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
                .bind(id)
                .fetch_one(pool)
                .await
                .unwrap();
        assert_ne!(stored_hash, "secret");
    }

    #[tokio::test]
    async fn test_duplicate_username_is_a_conflict() {
        let test_db = create_standard_test_db().await;

        let result = create_user(&test_db.pool, "op_one", "x", None, Role::Operator).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_list_users_scope() {
        let test_db = create_standard_test_db().await;

        let all = list_users(&test_db.pool, UserListScope::All).await.unwrap();
        assert_eq!(all.len(), 4);

        let operators = list_users(&test_db.pool, UserListScope::OperatorsOnly)
            .await
            .unwrap();
        assert_eq!(operators.len(), 2);
        assert!(operators.iter().all(|u| u.role == Role::Operator));
    }

    #[tokio::test]
    async fn test_update_user_changes_password() {
        let test_db = create_standard_test_db().await;
        let id = test_db.user_id("op_one");

        let updated = update_user(
            &test_db.pool,
            id,
            &UserUpdate {
                password: Some("new-password".to_string()),
                callsign: Some("BG7NEW".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.callsign.as_deref(), Some("BG7NEW"));
        assert_eq!(updated.username, "op_one");

        assert!(
            authenticate_user(&test_db.pool, "op_one", STANDARD_PASSWORD)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            authenticate_user(&test_db.pool, "op_one", "new-password")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_bootstrap_admin_created_then_restored() {
        let test_db = TestDbBuilder::new().build().await.unwrap();
        let pool = &test_db.pool;

        ensure_bootstrap_admin(pool, "first-password").await.unwrap();
        let admin = find_user_by_username(pool, BOOTSTRAP_ADMIN)
            .await
            .unwrap()
            .expect("Bootstrap admin should exist");
        assert_eq!(admin.role, Role::SuperAdmin);

        sqlx::query("UPDATE users SET role = 'operator' WHERE id = ?")
            .bind(admin.id)
            .execute(pool)
            .await
            .unwrap();

        ensure_bootstrap_admin(pool, "other-password").await.unwrap();
        let admin = find_user_by_username(pool, BOOTSTRAP_ADMIN)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(admin.role, Role::SuperAdmin);

        // The existing password is kept.
        assert!(
            authenticate_user(pool, BOOTSTRAP_ADMIN, "first-password")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_deleting_a_user_keeps_their_logs() {
        let test_db = create_standard_test_db().await;
        let session_id = test_db.session_id("NET-001");
        let operator_id = test_db.user_id("op_one");

        create_log(&test_db.pool, session_id, operator_id, &log_at("BG7NYL", 10, "FT-60R"))
            .await
            .unwrap();
        delete_user(&test_db.pool, operator_id).await.unwrap();

        let detail = get_session(&test_db.pool, session_id).await.unwrap();
        assert_eq!(detail.logs.len(), 1);
        assert_eq!(detail.logs[0].operator_user_id, operator_id);

        let orphan = detail
            .operators
            .iter()
            .find(|o| o.operator.user_id == operator_id)
            .expect("Roster row should survive");
        assert!(orphan.user.is_none());
    }

    #[tokio::test]
    async fn test_delete_session_removes_children() {
        let test_db = create_standard_test_db().await;
        let session_id = test_db.session_id("NET-001");
        let operator_id = test_db.user_id("op_one");

        create_log(&test_db.pool, session_id, operator_id, &log_at("BG7NYL", 10, "FT-60R"))
            .await
            .unwrap();

        delete_session(&test_db.pool, session_id).await.unwrap();

        assert_eq!(count(&test_db.pool, "logs").await, 0);
        assert_eq!(count(&test_db.pool, "session_operators").await, 0);
        assert_eq!(count(&test_db.pool, "net_sessions").await, 1);
        assert!(matches!(
            get_session(&test_db.pool, session_id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            delete_session(&test_db.pool, session_id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_session_roster_replacement() {
        let test_db = create_standard_test_db().await;
        let session_id = test_db.session_id("NET-001");

        let detail = update_session(
            &test_db.pool,
            session_id,
            &SessionUpdate {
                title: Some("Renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(detail.session.title, "Renamed");
        assert_eq!(detail.operators.len(), 2);

        let detail = update_session(
            &test_db.pool,
            session_id,
            &SessionUpdate {
                operators: Some(vec!["op_two".to_string(), "ghost".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(detail.operators.len(), 1);
        assert_eq!(detail.operators[0].operator.callsign, "op_two");
        assert_eq!(detail.session.title, "Renamed");
    }

    #[tokio::test]
    async fn test_last_by_callsign_picks_latest() {
        let test_db = create_standard_test_db().await;
        let operator_id = test_db.user_id("op_one");

        create_log(
            &test_db.pool,
            test_db.session_id("NET-001"),
            operator_id,
            &log_at("BG7NYL", 9, "old radio"),
        )
        .await
        .unwrap();
        create_log(
            &test_db.pool,
            test_db.session_id("NET-002"),
            operator_id,
            &log_at("BG7NYL", 11, "new radio"),
        )
        .await
        .unwrap();

        let details = last_by_callsign(&test_db.pool, "BG7NYL")
            .await
            .unwrap()
            .expect("Callsign was logged");
        assert_eq!(details.radio.as_deref(), Some("new radio"));
        assert_eq!(details.qth_city.as_deref(), Some("深圳市"));

        assert!(last_by_callsign(&test_db.pool, "BG7ZZZ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_import_logs_into_missing_session() {
        let test_db = create_standard_test_db().await;

        let result = import_logs(&test_db.pool, 9999, 1, &[log_at("BG7NYL", 9, "r")]).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(count(&test_db.pool, "logs").await, 0);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%"), "50\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("c:\\dir"), "c:\\\\dir");
        assert_eq!(escape_like("深圳"), "深圳");
    }

    #[tokio::test]
    async fn test_qth_search_and_idempotent_insert() {
        let test_db = TestDbBuilder::new().build().await.unwrap();
        let pool = &test_db.pool;

        let entries = vec![
            NewQthEntry {
                text: "广东省深圳市南山区".to_string(),
                province: "广东省".to_string(),
                city: "深圳市".to_string(),
                district: Some("南山区".to_string()),
            },
            NewQthEntry {
                text: "北京市".to_string(),
                province: "北京市".to_string(),
                city: "北京市".to_string(),
                district: None,
            },
            NewQthEntry {
                text: "100% field".to_string(),
                province: "测试".to_string(),
                city: "测试".to_string(),
                district: None,
            },
        ];

        assert_eq!(insert_qth_entries(pool, &entries).await.unwrap(), 3);
        assert_eq!(insert_qth_entries(pool, &entries).await.unwrap(), 0);

        let found = search_qth(pool, "南山").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].district.as_deref(), Some("南山区"));

        let found = search_qth(pool, "%").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "100% field");

        assert!(search_qth(pool, "   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_qth_search_is_limited() {
        let test_db = TestDbBuilder::new().build().await.unwrap();
        let entries: Vec<NewQthEntry> = (0..15)
            .map(|i| NewQthEntry {
                text: format!("Town {}", i),
                province: "Province".to_string(),
                city: format!("City {}", i),
                district: None,
            })
            .collect();
        insert_qth_entries(&test_db.pool, &entries).await.unwrap();

        let found = search_qth(&test_db.pool, "Province").await.unwrap();
        assert_eq!(found.len(), 10);
        assert_eq!(found[0].text, "Town 0");
    }

    #[tokio::test]
    async fn test_qth_search_is_case_insensitive() {
        let test_db = TestDbBuilder::new().build().await.unwrap();
        insert_qth_entries(
            &test_db.pool,
            &[NewQthEntry {
                text: "Shenzhen Nanshan".to_string(),
                province: "Guangdong".to_string(),
                city: "Shenzhen".to_string(),
                district: Some("Nanshan".to_string()),
            }],
        )
        .await
        .unwrap();

        for query in ["nanshan", "NANSHAN", "Nanshan", "sHENZHEN"] {
            let found = search_qth(&test_db.pool, query).await.unwrap();
            assert_eq!(found.len(), 1, "{} should match", query);
        }
    }

    #[tokio::test]
    async fn test_import_logs_rejects_deleted_account() {
        let test_db = create_standard_test_db().await;
        let session_id = test_db.session_id("NET-002");
        let operator_id = test_db.user_id("op_two");
        delete_user(&test_db.pool, operator_id).await.unwrap();

        let result = import_logs(
            &test_db.pool,
            session_id,
            operator_id,
            &[log_at("BG7NYL", 9, "FT-60R")],
        )
        .await;
        assert!(matches!(result, Err(AppError::Authentication(_))));

        let result = create_log(&test_db.pool, session_id, operator_id, &log_at("BG7NYL", 9, "r")).await;
        assert!(matches!(result, Err(AppError::Authentication(_))));
        assert_eq!(count(&test_db.pool, "logs").await, 0);
    }
}
