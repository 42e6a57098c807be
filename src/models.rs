use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

/// Equipment and location a station reported. Shared by logs and controls,
/// and returned on its own by the callsign pre-fill lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StationDetails {
    pub radio: Option<String>,
    pub antenna: Option<String>,
    pub power: Option<String>,
    pub qth_text: Option<String>,
    pub qth_province: Option<String>,
    pub qth_city: Option<String>,
    pub qth_district: Option<String>,
}

impl StationDetails {
    /// Applies a partial update. Absent fields keep their value and `null`
    /// clears them.
    pub fn merged(self, update: StationUpdate) -> Self {
        Self {
            radio: update.radio.unwrap_or(self.radio),
            antenna: update.antenna.unwrap_or(self.antenna),
            power: update.power.unwrap_or(self.power),
            qth_text: update.qth_text.unwrap_or(self.qth_text),
            qth_province: update.qth_province.unwrap_or(self.qth_province),
            qth_city: update.qth_city.unwrap_or(self.qth_city),
            qth_district: update.qth_district.unwrap_or(self.qth_district),
        }
    }
}

/// `None` when the field is missing, `Some(None)` when it is `null`.
fn nullable<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StationUpdate {
    #[serde(default, deserialize_with = "nullable")]
    pub radio: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub antenna: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub power: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub qth_text: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub qth_province: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub qth_city: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub qth_district: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NetSession {
    pub id: i64,
    pub external_id: String,
    pub title: String,
    pub date: DateTime<Utc>,
    pub net_callsign: String,
    pub tx_freq: String,
    pub rx_freq: Option<String>,
    pub mode: String,
    pub band: String,
    pub created_by: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Control {
    pub id: i64,
    pub session_id: i64,
    pub callsign: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub station: StationDetails,
    pub operator_user_id: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Log {
    pub id: i64,
    pub session_id: i64,
    pub operator_user_id: i64,
    pub participant_callsign: String,
    pub rst_rcvd: String,
    pub rst_sent: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub station: StationDetails,
    pub timestamp: DateTime<Utc>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SessionOperator {
    pub id: i64,
    pub session_id: i64,
    pub user_id: i64,
    pub callsign: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Public identity of a user attached to a roster row or a log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRef {
    pub id: i64,
    pub username: String,
    pub callsign: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOperatorView {
    #[serde(flatten)]
    pub operator: SessionOperator,
    pub user: Option<UserRef>,
}

/// A session with every dependent row loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: NetSession,
    pub controls: Vec<Control>,
    pub logs: Vec<Log>,
    pub operators: Vec<SessionOperatorView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct QthEntry {
    pub id: i64,
    pub text: String,
    pub province: String,
    pub city: String,
    pub district: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewQthEntry {
    pub text: String,
    pub province: String,
    pub city: String,
    pub district: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewSession {
    #[validate(length(min = 1, message = "external_id is required"))]
    pub external_id: String,
    #[validate(length(min = 1, message = "title is required"))]
    pub title: String,
    pub date: DateTime<Utc>,
    #[validate(length(min = 1, message = "net_callsign is required"))]
    pub net_callsign: String,
    #[validate(length(min = 1, message = "tx_freq is required"))]
    pub tx_freq: String,
    pub rx_freq: Option<String>,
    #[validate(length(min = 1, message = "mode is required"))]
    pub mode: String,
    #[validate(length(min = 1, message = "band is required"))]
    pub band: String,
    #[serde(default)]
    pub operators: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SessionUpdate {
    #[validate(length(min = 1, message = "external_id must not be empty"))]
    pub external_id: Option<String>,
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub title: Option<String>,
    pub date: Option<DateTime<Utc>>,
    #[validate(length(min = 1, message = "net_callsign must not be empty"))]
    pub net_callsign: Option<String>,
    #[validate(length(min = 1, message = "tx_freq must not be empty"))]
    pub tx_freq: Option<String>,
    /// `null` clears the receive frequency.
    #[serde(default, deserialize_with = "nullable")]
    pub rx_freq: Option<Option<String>>,
    #[validate(length(min = 1, message = "mode must not be empty"))]
    pub mode: Option<String>,
    #[validate(length(min = 1, message = "band must not be empty"))]
    pub band: Option<String>,
    /// `Some` replaces the whole roster, `None` leaves it untouched.
    pub operators: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewControl {
    #[validate(length(min = 1, message = "callsign is required"))]
    pub callsign: String,
    #[serde(flatten)]
    pub station: StationDetails,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewLog {
    #[validate(length(min = 1, message = "participant_callsign is required"))]
    pub participant_callsign: String,
    pub rst_rcvd: String,
    pub rst_sent: String,
    #[serde(flatten)]
    pub station: StationDetails,
    /// Defaults to the time of insertion.
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct LogUpdate {
    #[validate(length(min = 1, message = "participant_callsign must not be empty"))]
    pub participant_callsign: Option<String>,
    pub rst_rcvd: Option<String>,
    pub rst_sent: Option<String>,
    #[serde(flatten)]
    pub station: StationUpdate,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UserUpdate {
    #[validate(length(min = 1, message = "username must not be empty"))]
    pub username: Option<String>,
    #[validate(length(min = 1, message = "password must not be empty"))]
    pub password: Option<String>,
    pub callsign: Option<String>,
    pub role: Option<crate::auth::Role>,
}
