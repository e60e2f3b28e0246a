//! Label file: one class per line, `"<index> <class name>"`.

use std::path::Path;

use crate::error::{ensure_exists, PipelineError, Result};

pub fn write_labels(path: &Path, labels: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let body: String = labels.iter().enumerate()
        .map(|(i, name)| format!("{} {}\n", i, name))
        .collect();
    std::fs::write(path, body)?;
    Ok(())
}

/// Reads a label file. Blank lines are skipped and a leading numeric index
/// is stripped, so both `"0 Healthy"` and `"Healthy"` yield `"Healthy"`.
pub fn read_labels(path: &Path) -> Result<Vec<String>> {
    ensure_exists(path)?;
    let text = std::fs::read_to_string(path)?;
    let labels: Vec<String> = text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| strip_index(line).to_string())
        .collect();
    if labels.is_empty() {
        return Err(PipelineError::InvalidArtifact(format!("label file '{}' is empty", path.display())));
    }
    Ok(labels)
}

fn strip_index(line: &str) -> &str {
    match line.split_once(char::is_whitespace) {
        Some((head, rest)) if head.chars().all(|c| c.is_ascii_digit()) => rest.trim_start(),
        _ => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_prefixes_are_stripped() {
        assert_eq!(strip_index("0 Healthy"), "Healthy");
        assert_eq!(strip_index("12   Spider mites"), "Spider mites");
        assert_eq!(strip_index("Tomato___healthy"), "Tomato___healthy");
        assert_eq!(strip_index("Two words"), "Two words");
    }

    #[test]
    fn written_file_reads_back_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.txt");
        let names = vec!["Tomato___healthy".to_string(), "Tomato___Spider_mites".to_string()];
        write_labels(&path, &names).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0 Tomato___healthy\n1 Tomato___Spider_mites\n");
        assert_eq!(read_labels(&path).unwrap(), names);
    }
}
