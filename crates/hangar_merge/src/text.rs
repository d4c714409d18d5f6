//! Appending text and CSV contributions.

/// How contributions are joined onto the original text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendMode {
    /// Plain concatenation.
    Concat,
    /// Drop blank lines, keep one line per row, and drop a contribution's
    /// first line when it repeats the original header.
    NormalizeCsv,
}

pub fn append_text<S: AsRef<str>>(original: &str, contributions: &[S], mode: AppendMode) -> String {
    match mode {
        AppendMode::Concat => contributions
            .iter()
            .fold(original.to_string(), |mut acc, part| {
                acc.push_str(part.as_ref());
                acc
            }),
        AppendMode::NormalizeCsv => normalize_csv(original, contributions),
    }
}

fn normalize_csv<S: AsRef<str>>(original: &str, contributions: &[S]) -> String {
    let newline = if original.contains("\r\n") { "\r\n" } else { "\n" };
    let rows = |text: &str| -> Vec<String> {
        text.lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect()
    };

    let mut lines = rows(original);
    let header = lines.first().cloned();
    for part in contributions {
        let mut part_lines = rows(part.as_ref());
        if header.is_some() && part_lines.first() == header.as_ref() {
            part_lines.remove(0);
        }
        lines.extend(part_lines);
    }

    let mut out = lines.join(newline);
    if !out.is_empty() {
        out.push_str(newline);
    }
    out
}
