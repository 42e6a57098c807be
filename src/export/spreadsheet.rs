use std::collections::HashMap;
use std::io::Cursor;

use calamine::{Reader, open_workbook_auto_from_rs};
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_xlsxwriter::{Format, Workbook};
use tracing::{debug, instrument};

use super::{OperatorDirectory, format_timestamp};
use crate::error::AppError;
use crate::models::{Log, NetSession, NewLog, NewQthEntry, SessionDetail, StationDetails};
use crate::validation::non_blank;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub const SESSION_LOGS_SHEET: &str = "活动记录";
pub const ALL_SESSIONS_SHEET: &str = "所有活动记录";
pub const SESSION_LIST_SHEET: &str = "活动列表";

// Column labels, paired with the field name accepted on import.
pub const COL_EXTERNAL_ID: &str = "活动外部ID";
pub const COL_TITLE: &str = "活动标题";
pub const COL_DATE: &str = "活动日期";
pub const COL_NET_CALLSIGN: &str = "呼号";
pub const COL_TX_FREQ: &str = "发射频率";
pub const COL_RX_FREQ: &str = "接收频率";
pub const COL_MODE: &str = "模式";
pub const COL_BAND: &str = "波段";
pub const COL_PARTICIPANT: &str = "参与者呼号";
pub const COL_RST_RCVD: &str = "接收信号报告";
pub const COL_RST_SENT: &str = "发送信号报告";
pub const COL_RADIO: &str = "设备";
pub const COL_ANTENNA: &str = "天线";
pub const COL_POWER: &str = "功率";
pub const COL_QTH: &str = "地理位置";
pub const COL_PROVINCE: &str = "省份";
pub const COL_CITY: &str = "城市";
pub const COL_DISTRICT: &str = "区县";
pub const COL_TIMESTAMP: &str = "录入时间";
pub const COL_OPERATOR: &str = "操作员";
pub const COL_SUMMARY_EXTERNAL_ID: &str = "外部ID";
pub const COL_OPERATOR_CALLSIGNS: &str = "操作员呼号";

const SESSION_LOG_HEADERS: [&str; 14] = [
    COL_EXTERNAL_ID,
    COL_TITLE,
    COL_PARTICIPANT,
    COL_RST_RCVD,
    COL_RST_SENT,
    COL_RADIO,
    COL_ANTENNA,
    COL_POWER,
    COL_QTH,
    COL_PROVINCE,
    COL_CITY,
    COL_DISTRICT,
    COL_TIMESTAMP,
    COL_OPERATOR,
];

const ALL_SESSIONS_HEADERS: [&str; 20] = [
    COL_EXTERNAL_ID,
    COL_TITLE,
    COL_DATE,
    COL_NET_CALLSIGN,
    COL_TX_FREQ,
    COL_RX_FREQ,
    COL_MODE,
    COL_BAND,
    COL_PARTICIPANT,
    COL_RST_RCVD,
    COL_RST_SENT,
    COL_RADIO,
    COL_ANTENNA,
    COL_POWER,
    COL_QTH,
    COL_PROVINCE,
    COL_CITY,
    COL_DISTRICT,
    COL_TIMESTAMP,
    COL_OPERATOR,
];

const SESSION_LIST_HEADERS: [&str; 9] = [
    COL_TITLE,
    COL_SUMMARY_EXTERNAL_ID,
    COL_DATE,
    COL_NET_CALLSIGN,
    COL_TX_FREQ,
    COL_RX_FREQ,
    COL_MODE,
    COL_BAND,
    COL_OPERATOR_CALLSIGNS,
];

/// Writes a single-sheet workbook with a bold header row.
pub fn write_workbook(
    sheet_name: &str,
    headers: &[&str],
    rows: &[Vec<String>],
) -> Result<Vec<u8>, AppError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name)?;

    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &header_format)?;
    }
    for (row_idx, row) in rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            if !value.is_empty() {
                worksheet.write_string(row_idx as u32 + 1, col as u16, value)?;
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

fn opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn log_cells(log: &Log, operators: &OperatorDirectory) -> Vec<String> {
    vec![
        log.participant_callsign.clone(),
        log.rst_rcvd.clone(),
        log.rst_sent.clone(),
        opt(&log.station.radio),
        opt(&log.station.antenna),
        opt(&log.station.power),
        opt(&log.station.qth_text),
        opt(&log.station.qth_province),
        opt(&log.station.qth_city),
        opt(&log.station.qth_district),
        format_timestamp(&log.timestamp),
        operators.display_name(log.operator_user_id),
    ]
}

fn session_cells(session: &NetSession) -> Vec<String> {
    vec![
        session.external_id.clone(),
        session.title.clone(),
        format_timestamp(&session.date),
        session.net_callsign.clone(),
        session.tx_freq.clone(),
        opt(&session.rx_freq),
        session.mode.clone(),
        session.band.clone(),
    ]
}

#[instrument(skip_all, fields(session_id = detail.session.id, logs = detail.logs.len()))]
pub fn session_logs_workbook(
    detail: &SessionDetail,
    operators: &OperatorDirectory,
) -> Result<Vec<u8>, AppError> {
    let rows: Vec<Vec<String>> = detail
        .logs
        .iter()
        .map(|log| {
            let mut row = vec![detail.session.external_id.clone(), detail.session.title.clone()];
            row.extend(log_cells(log, operators));
            row
        })
        .collect();

    write_workbook(SESSION_LOGS_SHEET, &SESSION_LOG_HEADERS, &rows)
}

#[instrument(skip_all, fields(sessions = sessions.len()))]
pub fn all_sessions_workbook(
    sessions: &[SessionDetail],
    operators: &OperatorDirectory,
) -> Result<Vec<u8>, AppError> {
    let rows: Vec<Vec<String>> = sessions
        .iter()
        .flat_map(|detail| {
            detail.logs.iter().map(move |log| {
                let mut row = session_cells(&detail.session);
                row.extend(log_cells(log, operators));
                row
            })
        })
        .collect();

    write_workbook(ALL_SESSIONS_SHEET, &ALL_SESSIONS_HEADERS, &rows)
}

/// One row per session with its roster joined by commas.
pub fn session_list_workbook(sessions: &[SessionDetail]) -> Result<Vec<u8>, AppError> {
    let rows: Vec<Vec<String>> = sessions
        .iter()
        .map(|detail| {
            let s = &detail.session;
            let roster: Vec<String> = detail
                .operators
                .iter()
                .map(|op| match &op.user {
                    Some(user) => match user.callsign.as_deref() {
                        Some(callsign) if !callsign.is_empty() => callsign.to_string(),
                        _ => user.username.clone(),
                    },
                    None => op.operator.callsign.clone(),
                })
                .collect();

            vec![
                s.title.clone(),
                s.external_id.clone(),
                format_timestamp(&s.date),
                s.net_callsign.clone(),
                s.tx_freq.clone(),
                opt(&s.rx_freq),
                s.mode.clone(),
                s.band.clone(),
                roster.join(", "),
            ]
        })
        .collect();

    write_workbook(SESSION_LIST_SHEET, &SESSION_LIST_HEADERS, &rows)
}

/// A data row keyed by its trimmed header.
pub type SheetRow = HashMap<String, String>;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Reads the first sheet of an XLSX/XLS/ODS workbook, or a CSV file, into
/// header-keyed rows. Blank header cells are ignored.
pub fn read_rows(bytes: &[u8]) -> Result<Vec<SheetRow>, AppError> {
    if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) {
        read_workbook_rows(bytes)
    } else {
        read_csv_rows(bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes))
    }
}

fn read_workbook_rows(bytes: &[u8]) -> Result<Vec<SheetRow>, AppError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::Spreadsheet("Workbook contains no sheets".to_string()))??;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = header_row.iter().map(|c| c.to_string().trim().to_string()).collect();

    let parsed: Vec<SheetRow> = rows
        .map(|cells| {
            headers
                .iter()
                .zip(cells.iter())
                .filter(|(header, _)| !header.is_empty())
                .map(|(header, cell)| (header.clone(), cell.to_string().trim().to_string()))
                .collect()
        })
        .collect();

    debug!(rows = parsed.len(), "Read workbook rows");
    Ok(parsed)
}

fn read_csv_rows(bytes: &[u8]) -> Result<Vec<SheetRow>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();

    let mut parsed = Vec::new();
    for record in reader.records() {
        let record = record?;
        parsed.push(
            headers
                .iter()
                .zip(record.iter())
                .filter(|(header, _)| !header.is_empty())
                .map(|(header, value)| (header.clone(), value.to_string()))
                .collect(),
        );
    }

    debug!(rows = parsed.len(), "Read CSV rows");
    Ok(parsed)
}

/// First non-blank value among the given column names.
fn cell(row: &SheetRow, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| non_blank(row.get(*name).map(String::as_str)))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Default)]
pub struct ParsedLogs {
    pub logs: Vec<NewLog>,
    /// Rows that had no participant callsign.
    pub skipped: usize,
}

/// Maps imported rows onto new logs. Both the export labels and the field
/// names are accepted as headers.
pub fn parse_log_rows(rows: &[SheetRow]) -> ParsedLogs {
    let mut parsed = ParsedLogs::default();

    for row in rows {
        let Some(participant_callsign) = cell(row, &[COL_PARTICIPANT, "participant_callsign"])
        else {
            parsed.skipped += 1;
            continue;
        };

        parsed.logs.push(NewLog {
            participant_callsign,
            rst_rcvd: cell(row, &[COL_RST_RCVD, "rst_rcvd"]).unwrap_or_default(),
            rst_sent: cell(row, &[COL_RST_SENT, "rst_sent"]).unwrap_or_default(),
            station: StationDetails {
                radio: cell(row, &[COL_RADIO, "radio"]),
                antenna: cell(row, &[COL_ANTENNA, "antenna"]),
                power: cell(row, &[COL_POWER, "power"]),
                qth_text: cell(row, &[COL_QTH, "qth_text"]),
                qth_province: cell(row, &[COL_PROVINCE, "qth_province"]),
                qth_city: cell(row, &[COL_CITY, "qth_city"]),
                qth_district: cell(row, &[COL_DISTRICT, "qth_district"]),
            },
            timestamp: cell(row, &[COL_TIMESTAMP, "timestamp"]).and_then(|raw| parse_timestamp(&raw)),
        });
    }

    parsed
}

/// Maps imported rows onto QTH entries, dropping rows where every field is blank.
pub fn parse_qth_rows(rows: &[SheetRow]) -> Vec<NewQthEntry> {
    rows.iter()
        .filter_map(|row| {
            let text = cell(row, &[COL_QTH, "text", "qth_text"]);
            let province = cell(row, &[COL_PROVINCE, "province"]);
            let city = cell(row, &[COL_CITY, "city"]);
            let district = cell(row, &[COL_DISTRICT, "district"]);

            if text.is_none() && province.is_none() && city.is_none() && district.is_none() {
                return None;
            }

            Some(NewQthEntry {
                text: text.unwrap_or_default(),
                province: province.unwrap_or_default(),
                city: city.unwrap_or_default(),
                district,
            })
        })
        .collect()
}
