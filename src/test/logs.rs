#[cfg(test)]
mod tests {
    use crate::db::{delete_user, insert_qth_entries};
    use crate::models::{Log, NewQthEntry, QthEntry};
    use crate::test::test_utils::{
        STANDARD_PASSWORD, bearer, create_standard_test_db, login_test_user, setup_test_client,
    };
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::{Value, json};

    async fn post_log(client: &Client, token: &str, session_id: i64, body: Value) -> Log {
        let response = client
            .post(format!("/api/sessions/{}/logs", session_id))
            .header(ContentType::JSON)
            .header(bearer(token))
            .body(body.to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);
        response.into_json().await.unwrap()
    }

    #[rocket::async_test]
    async fn test_create_update_delete_log() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;
        let token = login_test_user(&client, "op_one", STANDARD_PASSWORD).await;
        let session_id = test_db.session_id("NET-001");

        let log = post_log(
            &client,
            &token,
            session_id,
            json!({
                "participant_callsign": "BG7NYL",
                "rst_rcvd": "59",
                "rst_sent": "57",
                "radio": "FT-60R",
                "qth_text": "广东省深圳市南山区",
                "timestamp": "2024-05-01T12:05:00Z"
            }),
        )
        .await;
        assert_eq!(log.session_id, session_id);
        assert_eq!(log.operator_user_id, test_db.user_id("op_one"));
        assert_eq!(log.station.radio.as_deref(), Some("FT-60R"));
        assert!(log.station.antenna.is_none());

        let url = format!("/api/sessions/{}/logs/{}", session_id, log.id);
        let response = client
            .put(url.as_str())
            .header(ContentType::JSON)
            .header(bearer(&token))
            .body(json!({ "rst_sent": "59", "antenna": "dipole" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let updated: Log = response.into_json().await.unwrap();
        assert_eq!(updated.rst_sent, "59");
        assert_eq!(updated.rst_rcvd, "59");
        assert_eq!(updated.station.antenna.as_deref(), Some("dipole"));
        assert_eq!(updated.station.radio.as_deref(), Some("FT-60R"));
        assert_eq!(updated.timestamp, log.timestamp);

        // A log is only reachable through the session it belongs to.
        let other_session = test_db.session_id("NET-002");
        let response = client
            .delete(format!("/api/sessions/{}/logs/{}", other_session, log.id))
            .header(bearer(&token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);

        let response = client.delete(url.as_str()).header(bearer(&token)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["message"], "Log deleted successfully");

        let response = client.delete(url.as_str()).header(bearer(&token)).dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_create_log_rejects_bad_input() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;
        let token = login_test_user(&client, "op_one", STANDARD_PASSWORD).await;

        let response = client
            .post(format!("/api/sessions/{}/logs", test_db.session_id("NET-001")))
            .header(ContentType::JSON)
            .header(bearer(&token))
            .body(json!({ "participant_callsign": "", "rst_rcvd": "59", "rst_sent": "59" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);

        let response = client
            .post("/api/sessions/9999/logs")
            .header(ContentType::JSON)
            .header(bearer(&token))
            .body(json!({ "participant_callsign": "BG7NYL", "rst_rcvd": "59", "rst_sent": "59" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_last_by_callsign() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;
        let token = login_test_user(&client, "op_two", STANDARD_PASSWORD).await;

        post_log(
            &client,
            &token,
            test_db.session_id("NET-001"),
            json!({
                "participant_callsign": "BG7NYL",
                "rst_rcvd": "59",
                "rst_sent": "59",
                "radio": "FT-60R",
                "timestamp": "2024-05-01T12:05:00Z"
            }),
        )
        .await;
        post_log(
            &client,
            &token,
            test_db.session_id("NET-002"),
            json!({
                "participant_callsign": "BG7NYL",
                "rst_rcvd": "59",
                "rst_sent": "59",
                "radio": "UV-5R",
                "power": "5W",
                "timestamp": "2024-05-08T12:05:00Z"
            }),
        )
        .await;

        let response = client
            .get("/api/last_by_callsign/BG7NYL")
            .header(bearer(&token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["radio"], "UV-5R");
        assert_eq!(body["power"], "5W");
        assert!(body["antenna"].is_null());

        let response = client
            .get("/api/last_by_callsign/BG7ZZZ")
            .header(bearer(&token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body, json!({}));
    }

    #[rocket::async_test]
    async fn test_qth_search() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;
        let token = login_test_user(&client, "op_one", STANDARD_PASSWORD).await;

        insert_qth_entries(
            &test_db.pool,
            &[
                NewQthEntry {
                    text: "广东省深圳市南山区".to_string(),
                    province: "广东省".to_string(),
                    city: "深圳市".to_string(),
                    district: Some("南山区".to_string()),
                },
                NewQthEntry {
                    text: "广东省广州市天河区".to_string(),
                    province: "广东省".to_string(),
                    city: "广州市".to_string(),
                    district: Some("天河区".to_string()),
                },
            ],
        )
        .await
        .unwrap();

        let response = client
            .get(format!("/api/qth/search?query={}", urlencoding::encode("广东")))
            .header(bearer(&token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let entries: Vec<QthEntry> = response.into_json().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].city, "深圳市");

        let response = client
            .get(format!("/api/qth/search?query={}", urlencoding::encode("天河")))
            .header(bearer(&token))
            .dispatch()
            .await;
        let entries: Vec<QthEntry> = response.into_json().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].district.as_deref(), Some("天河区"));

        for url in ["/api/qth/search", "/api/qth/search?query=", "/api/qth/search?query=%25"] {
            let response = client.get(url).header(bearer(&token)).dispatch().await;
            assert_eq!(response.status(), Status::Ok);
            let entries: Vec<QthEntry> = response.into_json().await.unwrap();
            assert!(entries.is_empty(), "{} should find nothing", url);
        }
    }

    #[rocket::async_test]
    async fn test_writes_rejected_after_account_deleted() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;
        let token = login_test_user(&client, "op_one", STANDARD_PASSWORD).await;
        let session_id = test_db.session_id("NET-001");

        delete_user(&test_db.pool, test_db.user_id("op_one"))
            .await
            .unwrap();

        let writes = [
            (
                format!("/api/sessions/{}/logs", session_id),
                json!({ "participant_callsign": "BG7NYL", "rst_rcvd": "59", "rst_sent": "59" }),
            ),
            (
                format!("/api/sessions/{}/controls", session_id),
                json!({ "callsign": "BY7KA", "radio": "FT-991A" }),
            ),
            (
                "/api/sessions".to_string(),
                json!({
                    "external_id": "NET-003",
                    "title": "Orphan Net",
                    "date": "2024-05-15T12:00:00Z",
                    "net_callsign": "BY7KA",
                    "tx_freq": "439.460",
                    "mode": "FM",
                    "band": "70cm"
                }),
            ),
        ];

        for (url, body) in writes {
            let response = client
                .post(url.as_str())
                .header(ContentType::JSON)
                .header(bearer(&token))
                .body(body.to_string())
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Unauthorized, "{}", url);
            let body: Value = response.into_json().await.unwrap();
            assert_eq!(body["error"], "User account no longer exists");
        }

        // A missing session is still reported as such.
        let response = client
            .post("/api/sessions/9999/logs")
            .header(ContentType::JSON)
            .header(bearer(&token))
            .body(json!({ "participant_callsign": "BG7NYL", "rst_rcvd": "59", "rst_sent": "59" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);

        for table in ["logs", "controls"] {
            let stored: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&test_db.pool)
                .await
                .unwrap();
            assert_eq!(stored, 0, "{} should stay empty", table);
        }
        let sessions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM net_sessions")
            .fetch_one(&test_db.pool)
            .await
            .unwrap();
        assert_eq!(sessions, 2);
    }

    #[rocket::async_test]
    async fn test_qth_search_ignores_ascii_case() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;
        let token = login_test_user(&client, "op_one", STANDARD_PASSWORD).await;

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

        for query in ["nanshan", "NANSHAN", "guangDONG"] {
            let response = client
                .get(format!("/api/qth/search?query={}", query))
                .header(bearer(&token))
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Ok);
            let entries: Vec<QthEntry> = response.into_json().await.unwrap();
            assert_eq!(entries.len(), 1, "{} should match", query);
            assert_eq!(entries[0].text, "Shenzhen Nanshan");
        }
    }

    #[rocket::async_test]
    async fn test_update_log_null_clears_station_field() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;
        let token = login_test_user(&client, "op_one", STANDARD_PASSWORD).await;
        let session_id = test_db.session_id("NET-001");

        let log = post_log(
            &client,
            &token,
            session_id,
            json!({
                "participant_callsign": "BG7NYL",
                "rst_rcvd": "59",
                "rst_sent": "59",
                "radio": "FT-60R",
                "power": "5W"
            }),
        )
        .await;

        let response = client
            .put(format!("/api/sessions/{}/logs/{}", session_id, log.id))
            .header(ContentType::JSON)
            .header(bearer(&token))
            .body(json!({ "radio": null }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let updated: Log = response.into_json().await.unwrap();
        assert!(updated.station.radio.is_none());
        assert_eq!(updated.station.power.as_deref(), Some("5W"));
    }
}
