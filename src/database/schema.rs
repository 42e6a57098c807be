pub const CURRENT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    callsign TEXT,
    role TEXT NOT NULL DEFAULT 'operator' CHECK (role IN ('super_admin', 'admin', 'operator')),
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS net_sessions (
    id INTEGER PRIMARY KEY,
    external_id TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    date TEXT NOT NULL,
    net_callsign TEXT NOT NULL,
    tx_freq TEXT NOT NULL,
    rx_freq TEXT,
    mode TEXT NOT NULL,
    band TEXT NOT NULL,
    created_by INTEGER NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS controls (
    id INTEGER PRIMARY KEY,
    session_id INTEGER NOT NULL,
    callsign TEXT NOT NULL,
    radio TEXT,
    antenna TEXT,
    power TEXT,
    qth_text TEXT,
    qth_province TEXT,
    qth_city TEXT,
    qth_district TEXT,
    operator_user_id INTEGER NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (session_id) REFERENCES net_sessions (id)
);

CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY,
    session_id INTEGER NOT NULL,
    operator_user_id INTEGER NOT NULL,
    participant_callsign TEXT NOT NULL,
    rst_rcvd TEXT NOT NULL,
    rst_sent TEXT NOT NULL,
    radio TEXT,
    antenna TEXT,
    power TEXT,
    qth_text TEXT,
    qth_province TEXT,
    qth_city TEXT,
    qth_district TEXT,
    timestamp TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (session_id) REFERENCES net_sessions (id)
);

CREATE TABLE IF NOT EXISTS session_operators (
    id INTEGER PRIMARY KEY,
    session_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    callsign TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (session_id) REFERENCES net_sessions (id)
);

CREATE TABLE IF NOT EXISTS qth_entries (
    id INTEGER PRIMARY KEY,
    text TEXT NOT NULL,
    province TEXT NOT NULL,
    city TEXT NOT NULL,
    district TEXT,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_net_sessions_date ON net_sessions (date);
CREATE INDEX IF NOT EXISTS idx_controls_session ON controls (session_id);
CREATE INDEX IF NOT EXISTS idx_logs_session ON logs (session_id);
CREATE INDEX IF NOT EXISTS idx_logs_callsign_timestamp ON logs (participant_callsign, timestamp);
CREATE INDEX IF NOT EXISTS idx_session_operators_session ON session_operators (session_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_qth_entries_unique
    ON qth_entries (text, province, city, IFNULL(district, ''));
"#;
