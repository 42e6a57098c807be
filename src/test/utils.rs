#[cfg(test)]
pub mod test_db {
    use crate::auth::Role;
    use crate::db::{create_session, create_user};
    use crate::database::run_migrations;
    use crate::error::AppError;
    use crate::models::NewSession;
    use chrono::{TimeZone, Utc};
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::sync::Once;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        sessions: Vec<TestSession>,
    }

    pub struct TestUser {
        pub username: String,
        pub callsign: Option<String>,
        pub role: Role,
        pub password: String,
    }

    pub struct TestSession {
        pub external_id: String,
        pub title: String,
        pub day: u32,
        pub created_by: String,
        pub operators: Vec<String>,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        fn user(mut self, username: &str, callsign: Option<&str>, role: Role) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                callsign: callsign.map(String::from),
                role,
                password: STANDARD_PASSWORD.to_string(),
            });
            self
        }

        pub fn super_admin(self, username: &str, callsign: Option<&str>) -> Self {
            self.user(username, callsign, Role::SuperAdmin)
        }

        pub fn admin(self, username: &str, callsign: Option<&str>) -> Self {
            self.user(username, callsign, Role::Admin)
        }

        pub fn operator(self, username: &str, callsign: Option<&str>) -> Self {
            self.user(username, callsign, Role::Operator)
        }

        pub fn user_with_password(
            mut self,
            username: &str,
            callsign: Option<&str>,
            role: Role,
            password: &str,
        ) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                callsign: callsign.map(String::from),
                role,
                password: password.to_string(),
            });
            self
        }

        /// Adds a session dated May `day`, 2024 at 12:00 UTC.
        pub fn session(
            mut self,
            external_id: &str,
            title: &str,
            day: u32,
            created_by: &str,
            operators: &[&str],
        ) -> Self {
            self.sessions.push(TestSession {
                external_id: external_id.to_string(),
                title: title.to_string(),
                day,
                created_by: created_by.to_string(),
                operators: operators.iter().map(|o| o.to_string()).collect(),
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                    .with_test_writer()
                    .try_init();
            });

            // A single connection that never expires, so the in-memory
            // database lives as long as the pool.
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await?;

            run_migrations(&pool).await?;

            let mut user_id_map: HashMap<String, i64> = HashMap::new();
            let mut session_id_map: HashMap<String, i64> = HashMap::new();

            for user in &self.users {
                let user_id = create_user(
                    &pool,
                    &user.username,
                    &user.password,
                    user.callsign.as_deref(),
                    user.role,
                )
                .await?;

                user_id_map.insert(user.username.clone(), user_id);
            }

            for session in &self.sessions {
                let created_by = user_id_map.get(&session.created_by).copied().unwrap_or(1);
                let new_session = NewSession {
                    external_id: session.external_id.clone(),
                    title: session.title.clone(),
                    date: Utc
                        .with_ymd_and_hms(2024, 5, session.day, 12, 0, 0)
                        .single()
                        .ok_or_else(|| AppError::Internal("bad test date".to_string()))?,
                    net_callsign: "BY7KA".to_string(),
                    tx_freq: "439.460".to_string(),
                    rx_freq: Some("434.460".to_string()),
                    mode: "FM".to_string(),
                    band: "70cm".to_string(),
                    operators: Some(session.operators.clone()),
                };

                let session_id = create_session(&pool, created_by, &new_session).await?;
                session_id_map.insert(session.external_id.clone(), session_id);
            }

            Ok(TestDb {
                pool,
                user_id_map,
                session_id_map,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_id_map: HashMap<String, i64>,
        pub session_id_map: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn user_id(&self, username: &str) -> i64 {
            self.user_id_map[username]
        }

        pub fn session_id(&self, external_id: &str) -> i64 {
            self.session_id_map[external_id]
        }
    }
}

#[cfg(test)]
pub mod test_utils {
    pub use super::test_db::*;

    use crate::config::AppConfig;
    use crate::init_rocket;
    use rocket::http::{ContentType, Header, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::{Value, json};
    use std::path::PathBuf;
    use uuid::Uuid;

    pub const TEST_JWT_SECRET: &str = "test-signing-secret";
    const BOUNDARY: &str = "----hamrollcall-test-boundary";

    /// The standard fixture: one user per role plus two sessions.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .super_admin("root", Some("BY7ROOT"))
            .admin("admin_user", Some("BG7ADM"))
            .operator("op_one", Some("BG7OPA"))
            .operator("op_two", None)
            .session("NET-001", "Weekly Net", 1, "admin_user", &["op_one", "op_two"])
            .session("NET-002", "周日 晚间点名", 8, "op_one", &[])
            .build()
            .await
            .expect("Failed to build test database")
    }

    /// Config pointing at a fresh scratch directory.
    pub fn test_config() -> AppConfig {
        let root: PathBuf = std::env::temp_dir().join(format!("ham-rollcall-test-{}", Uuid::new_v4()));

        AppConfig {
            port: 0,
            address: "127.0.0.1".to_string(),
            database_path: root.join("ham_rollcall.db"),
            jwt_secret: TEST_JWT_SECRET.to_string(),
            upload_dir: root.join("uploads"),
            frontend_dir: root.join("frontend"),
            admin_default_password: STANDARD_PASSWORD.to_string(),
        }
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        setup_test_client_with_config(test_db, test_config()).await
    }

    pub async fn setup_test_client_with_config(
        test_db: TestDb,
        config: AppConfig,
    ) -> (Client, TestDb) {
        let rocket = init_rocket(test_db.pool.clone(), config);
        let client = Client::tracked(rocket)
            .await
            .expect("Failed to create test client");

        (client, test_db)
    }

    /// Logs in and returns the bearer token.
    pub async fn login_test_user(client: &Client, username: &str, password: &str) -> String {
        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({ "username": username, "password": password }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok, "login failed for {}", username);
        let body: Value = response.into_json().await.expect("login response body");
        body["token"]
            .as_str()
            .expect("login response without token")
            .to_string()
    }

    pub fn bearer(token: &str) -> Header<'static> {
        Header::new("Authorization", format!("Bearer {}", token))
    }

    /// Builds a `multipart/form-data` body with plain fields and an optional file.
    pub fn multipart(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> (ContentType, Vec<u8>) {
        let mut body = Vec::new();

        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }

        if let Some((filename, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    BOUNDARY, filename
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }

        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        let content_type =
            ContentType::new("multipart", "form-data").with_params(("boundary", BOUNDARY));
        (content_type, body)
    }
}
