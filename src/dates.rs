use chrono::NaiveDate;

const ACCEPTED_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];

/// Boundary conversion for externally supplied date strings. Everything the
/// reconciler stores as a date passes through here exactly once.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    ACCEPTED_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_iso_dates() {
        assert_eq!(
            parse_date("2026-03-15"),
            NaiveDate::from_ymd_opt(2026, 3, 15)
        );
    }

    #[test]
    fn accepts_uk_dates() {
        assert_eq!(
            parse_date("15/03/2026"),
            NaiveDate::from_ymd_opt(2026, 3, 15)
        );
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        assert_eq!(
            parse_date("  2026-03-15 "),
            NaiveDate::from_ymd_opt(2026, 3, 15)
        );
    }

    #[test]
    fn rejects_unrecognized_input() {
        assert_eq!(parse_date("next Tuesday"), None);
        assert_eq!(parse_date("2026/03/15"), None);
        assert_eq!(parse_date(""), None);
    }
}
