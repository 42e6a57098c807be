use super::OperatorDirectory;
use crate::models::SessionDetail;

pub const ADIF_VERSION: &str = "3.1.4";
pub const PROGRAM_ID: &str = "HamRollCall";
pub const PROGRAM_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One `<NAME:len>value` field followed by CRLF. The length counts characters.
pub fn adif_field(name: &str, value: &str) -> String {
    format!("<{}:{}>{}\r\n", name, value.chars().count(), value)
}

fn push_field(out: &mut String, name: &str, value: &str) {
    out.push_str(&adif_field(name, value));
}

fn push_optional(out: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        push_field(out, name, value);
    }
}

/// Renders every log of the session as an ADIF record.
pub fn session_adif(detail: &SessionDetail, operators: &OperatorDirectory) -> String {
    let session = &detail.session;
    let mut out = format!(
        "Ham roll-call log export for {}\r\n",
        session.external_id
    );
    push_field(&mut out, "ADIF_VER", ADIF_VERSION);
    push_field(&mut out, "PROGRAMID", PROGRAM_ID);
    push_field(&mut out, "PROGRAMVERSION", PROGRAM_VERSION);
    out.push_str("<EOH>\r\n");

    let control = detail.controls.first();
    let my_rig = control.and_then(|c| c.station.radio.as_deref()).unwrap_or("");
    let my_antenna = control.and_then(|c| c.station.antenna.as_deref()).unwrap_or("");

    for log in &detail.logs {
        push_field(&mut out, "CALL", &log.participant_callsign);
        push_field(&mut out, "RST_RCVD", &log.rst_rcvd);
        push_field(&mut out, "RST_SENT", &log.rst_sent);
        push_optional(&mut out, "RIG", log.station.radio.as_deref());
        push_optional(&mut out, "ANTENNA", log.station.antenna.as_deref());
        push_optional(&mut out, "PWR", log.station.power.as_deref());
        push_optional(&mut out, "QTH", log.station.qth_text.as_deref());
        push_field(&mut out, "QSO_DATE", &log.timestamp.format("%Y%m%d").to_string());
        push_field(&mut out, "TIME_ON", &log.timestamp.format("%H%M%S").to_string());
        push_field(&mut out, "BAND", &session.band);
        push_field(&mut out, "MODE", &session.mode);
        push_field(&mut out, "FREQ", &session.tx_freq);
        push_field(&mut out, "STATION_CALLSIGN", &session.net_callsign);
        push_field(&mut out, "MY_RIG", my_rig);
        push_field(&mut out, "MY_ANTENNA", my_antenna);
        push_field(&mut out, "OPERATOR", &operators.display_name(log.operator_user_id));
        out.push_str("<EOR>\r\n");
    }

    out
}
