//! Save-filename timestamp suffixes.
//!
//! Uploaded saves carry a suffix of the form ` [YYYY-MM-DD HH-MM-SS-mmmZ]`.
//! The trailing `Z` marks UTC; older uploads wrote the suffix in local time
//! without the `Z`, and those still parse for backward compatibility.

use std::sync::LazyLock;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

static SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r" \[\d{4}-\d{2}-\d{2} \d{2}-\d{2}-\d{2}-\d{3}Z?\]$").expect("valid suffix regex")
});

static EXTRACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(\d{4}-\d{2}-\d{2}) (\d{2})-(\d{2})-(\d{2})-\d{3}(Z?)\]$")
        .expect("valid extract regex")
});

/// Strip the timestamp suffix, yielding the base name used to match a
/// remote save against a local file.
pub fn strip_save_suffix(file_name_no_ext: &str) -> &str {
    match SUFFIX.find(file_name_no_ext) {
        Some(m) => &file_name_no_ext[..m.start()],
        None => file_name_no_ext,
    }
}

/// Parse the timestamp suffix. `None` when no well-formed suffix is
/// present. Milliseconds in the suffix are ignored; comparisons happen at
/// one-second precision anyway.
pub fn parse_save_timestamp(file_name_no_ext: &str) -> Option<DateTime<Utc>> {
    let caps = EXTRACT.captures(file_name_no_ext)?;
    let raw = format!("{} {}:{}:{}", &caps[1], &caps[2], &caps[3], &caps[4]);
    let naive = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S").ok()?;

    if &caps[5] == "Z" {
        Some(Utc.from_utc_datetime(&naive))
    } else {
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Build an upload filename: base name, fresh UTC suffix, extension.
pub fn stamped_file_name(base: &str, extension: &str, at: DateTime<Utc>) -> String {
    let stamp = at.format("%Y-%m-%d %H-%M-%S-%3f");
    if extension.is_empty() {
        format!("{base} [{stamp}Z]")
    } else {
        format!("{base} [{stamp}Z].{extension}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_suffix_for_base_matching() {
        assert_eq!(
            strip_save_suffix("Pokemon Red [2024-01-02 15-04-05-000Z]"),
            "Pokemon Red"
        );
        assert_eq!(
            strip_save_suffix("Pokemon Red [2024-01-02 15-04-05-000]"),
            "Pokemon Red"
        );
        assert_eq!(strip_save_suffix("Pokemon Red"), "Pokemon Red");
        // Malformed suffixes are part of the name.
        assert_eq!(
            strip_save_suffix("Save [2024-01-02]"),
            "Save [2024-01-02]"
        );
    }

    #[test]
    fn z_suffix_parses_as_utc() {
        let t = parse_save_timestamp("Game [2024-01-02 15-04-05-123Z]").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2024, 1, 2, 15, 4, 5).unwrap());
    }

    #[test]
    fn legacy_suffix_parses_as_local_time() {
        let t = parse_save_timestamp("Game [2024-01-02 15-04-05-123]").unwrap();
        let expected = Local
            .with_ymd_and_hms(2024, 1, 2, 15, 4, 5)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(t, expected);
    }

    #[test]
    fn unparsable_suffix_yields_none() {
        assert!(parse_save_timestamp("Game").is_none());
        assert!(parse_save_timestamp("Game [2024-01-02]").is_none());
        assert!(parse_save_timestamp("Game [24-01-02 15-04-05-000Z]").is_none());
    }

    #[test]
    fn stamped_names_round_trip() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 17, 30, 5).unwrap();
        let name = stamped_file_name("Zelda", "srm", at);
        assert_eq!(name, "Zelda [2024-03-01 17-30-05-000Z].srm");

        let no_ext = name.rsplit_once('.').unwrap().0;
        assert_eq!(strip_save_suffix(no_ext), "Zelda");
        assert_eq!(parse_save_timestamp(no_ext), Some(at));
    }
}
