use super::spreadsheet::{
    COL_ANTENNA, COL_CITY, COL_DISTRICT, COL_PARTICIPANT, COL_POWER, COL_PROVINCE, COL_QTH,
    COL_RADIO, COL_RST_RCVD, COL_RST_SENT, write_workbook,
};
use crate::error::AppError;

pub const IMPORT_TEMPLATE_FILENAME: &str = "import_template.xlsx";
pub const QTH_TEMPLATE_FILENAME: &str = "qth_template.xlsx";

const IMPORT_TEMPLATE_SHEET: &str = "导入模板";
const QTH_TEMPLATE_SHEET: &str = "QTH数据模板";

const IMPORT_TEMPLATE_HEADERS: [&str; 10] = [
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
];

const IMPORT_TEMPLATE_ROW: [&str; 10] = [
    "BG7NYL",
    "59",
    "59",
    "IC-7300",
    " dipole",
    "100W",
    "广东省深圳市南山区",
    "广东省",
    "深圳市",
    "南山区",
];

const QTH_TEMPLATE_HEADERS: [&str; 4] = [COL_QTH, COL_PROVINCE, COL_CITY, COL_DISTRICT];

pub const QTH_TEMPLATE_ROWS: [[&str; 4]; 8] = [
    ["四川省成都市龙泉驿区", "四川省", "成都市", "龙泉驿区"],
    ["北京市朝阳区", "北京市", "北京市", "朝阳区"],
    ["上海市浦东新区张江高科技园区", "上海市", "上海市", "浦东新区"],
    ["广东省深圳市南山区科技园", "广东省", "深圳市", "南山区"],
    ["浙江省杭州市西湖区", "浙江省", "杭州市", "西湖区"],
    ["江苏省南京市玄武区", "江苏省", "南京市", "玄武区"],
    ["湖北省武汉市武昌区", "湖北省", "武汉市", "武昌区"],
    ["陕西省西安市雁塔区", "陕西省", "西安市", "雁塔区"],
];

fn to_rows<const N: usize>(rows: &[[&str; N]]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| row.iter().map(|v| v.to_string()).collect())
        .collect()
}

/// One example row showing the columns the log import understands.
pub fn import_template() -> Result<Vec<u8>, AppError> {
    write_workbook(
        IMPORT_TEMPLATE_SHEET,
        &IMPORT_TEMPLATE_HEADERS,
        &to_rows(&[IMPORT_TEMPLATE_ROW]),
    )
}

pub fn qth_template() -> Result<Vec<u8>, AppError> {
    write_workbook(QTH_TEMPLATE_SHEET, &QTH_TEMPLATE_HEADERS, &to_rows(&QTH_TEMPLATE_ROWS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::spreadsheet::{parse_log_rows, parse_qth_rows, read_rows};

    #[test]
    fn qth_template_parses_into_eight_entries() {
        let rows = read_rows(&qth_template().unwrap()).unwrap();
        let entries = parse_qth_rows(&rows);

        assert_eq!(entries.len(), 8);
        assert_eq!(entries[2].text, "上海市浦东新区张江高科技园区");
        assert_eq!(entries[2].district.as_deref(), Some("浦东新区"));
    }

    #[test]
    fn import_template_parses_into_one_log() {
        let rows = read_rows(&import_template().unwrap()).unwrap();
        let parsed = parse_log_rows(&rows);

        assert_eq!(parsed.logs.len(), 1);
        assert_eq!(parsed.skipped, 0);
        let log = &parsed.logs[0];
        assert_eq!(log.participant_callsign, "BG7NYL");
        assert_eq!(log.station.antenna.as_deref(), Some("dipole"));
        assert_eq!(log.station.qth_city.as_deref(), Some("深圳市"));
        assert!(log.timestamp.is_none());
    }
}
