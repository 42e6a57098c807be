pub mod auth;
pub mod backup;
pub mod download;
pub mod frontend;
pub mod logs;
pub mod sessions;
pub mod transfer;
pub mod users;

use rocket::{Catcher, Route};

use crate::auth::{
    bad_request_api, forbidden_api, internal_error_api, not_found_api, unauthorized_api,
    unprocessable_api,
};

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

pub fn routes() -> Vec<Route> {
    routes![
        health,
        auth::api_register,
        auth::api_login,
        auth::api_me,
        users::api_list_users,
        users::api_create_user,
        users::api_update_user,
        users::api_delete_user,
        sessions::api_create_session,
        sessions::api_list_sessions,
        sessions::api_get_session,
        sessions::api_update_session,
        sessions::api_delete_session,
        sessions::api_create_control,
        logs::api_create_log,
        logs::api_update_log,
        logs::api_delete_log,
        logs::api_last_by_callsign,
        logs::api_qth_search,
        transfer::api_export_session_list,
        transfer::api_export_session_excel,
        transfer::api_export_session_adif,
        transfer::api_export_all_sessions,
        transfer::api_import_template,
        transfer::api_qth_template,
        transfer::api_import_logs,
        transfer::api_import_qth,
        backup::api_backup_download,
        backup::api_backup_restore,
    ]
}

pub fn catchers() -> Vec<Catcher> {
    catchers![
        bad_request_api,
        unauthorized_api,
        forbidden_api,
        not_found_api,
        unprocessable_api,
        internal_error_api
    ]
}
