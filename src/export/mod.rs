//! Spreadsheet and ADIF renderings of sessions, plus the spreadsheet reader
//! used by the import endpoints.

pub mod adif;
pub mod spreadsheet;
pub mod templates;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::UserRef;

/// Users by id, used to print operator names.
#[derive(Debug, Default, Clone)]
pub struct OperatorDirectory {
    users: HashMap<i64, UserRef>,
}

impl OperatorDirectory {
    pub fn new(users: impl IntoIterator<Item = UserRef>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.id, u)).collect(),
        }
    }

    /// Callsign, then username, then the raw id for users that no longer exist.
    pub fn display_name(&self, user_id: i64) -> String {
        match self.users.get(&user_id) {
            Some(UserRef {
                callsign: Some(callsign),
                ..
            }) if !callsign.is_empty() => callsign.clone(),
            Some(user) => user.username.clone(),
            None => user_id.to_string(),
        }
    }
}

/// Keeps ASCII letters, digits, `_` and CJK unified ideographs.
pub fn safe_file_stem(title: &str) -> String {
    let stem: String = title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || ('\u{4e00}'..='\u{9fa5}').contains(c))
        .collect();

    if stem.is_empty() {
        "session".to_string()
    } else {
        stem
    }
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_file_stem_keeps_cjk_and_word_chars() {
        assert_eq!(safe_file_stem("周日 晚间点名 #12!"), "周日晚间点名12");
        assert_eq!(safe_file_stem("Net_2024-05"), "Net_202405");
        assert_eq!(safe_file_stem("***"), "session");
    }

    #[test]
    fn display_name_falls_back_to_username_then_id() {
        let directory = OperatorDirectory::new(vec![
            UserRef {
                id: 1,
                username: "alice".to_string(),
                callsign: Some("BG7AAA".to_string()),
            },
            UserRef {
                id: 2,
                username: "bob".to_string(),
                callsign: Some(String::new()),
            },
        ]);

        assert_eq!(directory.display_name(1), "BG7AAA");
        assert_eq!(directory.display_name(2), "bob");
        assert_eq!(directory.display_name(9), "9");
    }
}
