//! Fixtures shared by the unit tests.

use std::path::{Path, PathBuf};

pub const SAMPLE_TITLE: &str = "【令和７年９月１日時点】";
pub const SAMPLE_HEADER: &str = "施設所在区,標準地域コード,施設・事業名,施設番号,\
０歳児,１歳児,２歳児,３歳児,４歳児,５歳児,合計,更新日";

/// Builds an export body: title row, column names, then the given data lines,
/// all CRLF terminated.
pub fn sample_csv(lines: &[&str]) -> String {
    let mut out = format!("{SAMPLE_TITLE}\r\n{SAMPLE_HEADER}\r\n");
    for line in lines {
        out.push_str(line);
        out.push_str("\r\n");
    }
    out
}

/// Encodes `content` as Shift_JIS.
pub fn sjis_bytes(content: &str) -> Vec<u8> {
    let (bytes, _, had_errors) = encoding_rs::SHIFT_JIS.encode(content);
    assert!(!had_errors, "fixture not representable in Shift_JIS");
    bytes.into_owned()
}

/// Writes `content` as Shift_JIS bytes.
pub fn write_sjis(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, sjis_bytes(content)).unwrap();
    path
}
