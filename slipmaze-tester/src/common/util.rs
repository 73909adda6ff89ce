use chrono::{SecondsFormat, Utc};

/// UTC timestamp stamped into report headers.
pub fn report_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_csv_trims_and_filters() {
        let parts = split_csv(" maze-1.txt, ,maze-2.txt,  maze-10.txt ");
        assert_eq!(parts, vec!["maze-1.txt", "maze-2.txt", "maze-10.txt"]);
    }

    #[test]
    fn report_timestamp_is_utc() {
        let ts = report_timestamp();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
