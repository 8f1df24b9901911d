//! Filename handling for received files.
//!
//! Remote filenames are untrusted. They are reduced to their last path
//! component before anything touches the disk.

/// Reduce a remote filename to a safe local name.
///
/// Keeps only the final component (either separator), strips control
/// characters, and rejects names that end up empty, `.` or `..`.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let last = raw.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(raw);
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    match cleaned {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

/// Candidate names for placing `filename` in a directory without clobbering.
///
/// Yields `name.ext`, then `name-2.ext`, `name-3.ext`, and so on.
/// Leading-dot names like `.bashrc` are treated as having no extension.
pub fn candidate_names(filename: &str) -> impl Iterator<Item = String> + '_ {
    let (stem, ext) = match filename.rfind('.') {
        Some(idx) if idx > 0 => (&filename[..idx], &filename[idx..]),
        _ => (filename, ""),
    };
    std::iter::once(filename.to_string())
        .chain((2u32..).map(move |n| format!("{}-{}{}", stem, n, ext)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_plain_names() {
        assert_eq!(sanitize_filename("report.pdf").as_deref(), Some("report.pdf"));
    }

    #[test]
    fn strips_directories() {
        assert_eq!(
            sanitize_filename("../../etc/passwd").as_deref(),
            Some("passwd")
        );
        assert_eq!(
            sanitize_filename("C:\\Users\\me\\notes.txt").as_deref(),
            Some("notes.txt")
        );
    }

    #[test]
    fn rejects_empty_and_dots() {
        assert_eq!(sanitize_filename(""), None);
        assert_eq!(sanitize_filename("dir/"), None);
        assert_eq!(sanitize_filename(".."), None);
        assert_eq!(sanitize_filename("a/."), None);
    }

    #[test]
    fn drops_control_characters() {
        assert_eq!(
            sanitize_filename("bad\u{0}name\n.txt").as_deref(),
            Some("badname.txt")
        );
    }

    #[test]
    fn candidates_number_before_extension() {
        let names: Vec<_> = candidate_names("report.pdf").take(3).collect();
        assert_eq!(names, vec!["report.pdf", "report-2.pdf", "report-3.pdf"]);
    }

    #[test]
    fn candidates_without_extension() {
        let names: Vec<_> = candidate_names("README").take(2).collect();
        assert_eq!(names, vec!["README", "README-2"]);

        let names: Vec<_> = candidate_names(".env").take(2).collect();
        assert_eq!(names, vec![".env", ".env-2"]);
    }

    #[test]
    fn candidates_use_last_dot() {
        let names: Vec<_> = candidate_names("archive.tar.gz").skip(1).take(1).collect();
        assert_eq!(names, vec!["archive.tar-2.gz"]);
    }
}
