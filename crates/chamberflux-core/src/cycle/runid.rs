use std::path::Path;

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_time_segment(s: &str) -> bool {
    all_digits(s) && (s.len() == 4 || s.len() == 6)
}

fn format_run_id(date: &str, time: &str) -> String {
    if time.len() == 4 {
        format!("{date}_{time}00")
    } else {
        format!("{date}_{time}")
    }
}

/// Derive the run id of a measurement file from the date/time encoded in its name.
///
/// `SITE_20240701_1200.csv` and `SITE-20240701120000.csv` both give `20240701_120000`. Names
/// without a recognizable date/time fall back to the file stem.
pub fn run_id_from_filename(name: &str) -> String {
    let stem = Path::new(name).file_stem().and_then(|s| s.to_str()).unwrap_or(name);

    let segments: Vec<&str> = stem.split(['_', '-', ' ']).collect();
    for (i, seg) in segments.iter().enumerate() {
        if all_digits(seg) && seg.len() == 8 {
            if let Some(next) = segments.get(i + 1).filter(|s| is_time_segment(s)) {
                return format_run_id(seg, next);
            }
        }
        if all_digits(seg) && (seg.len() == 12 || seg.len() == 14) {
            let (date, time) = seg.split_at(8);
            return format_run_id(date, time);
        }
    }
    stem.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separate_date_and_time_segments() {
        assert_eq!(run_id_from_filename("SITE_20240701_120000.csv"), "20240701_120000");
        assert_eq!(run_id_from_filename("SITE_20240701_1200.csv"), "20240701_120000");
        assert_eq!(run_id_from_filename("data/SITE-20240701-0830.csv"), "20240701_083000");
    }

    #[test]
    fn single_datetime_segment() {
        assert_eq!(run_id_from_filename("run_202407011200.csv"), "20240701_120000");
        assert_eq!(run_id_from_filename("run_20240701120130.csv"), "20240701_120130");
    }

    #[test]
    fn falls_back_to_stem() {
        assert_eq!(run_id_from_filename("corrupt.csv"), "corrupt");
        assert_eq!(run_id_from_filename("SITE_20240701.csv"), "SITE_20240701");
    }
}
