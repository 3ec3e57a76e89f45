//! Activity log subsystem (C7).
//!
//! The censored-word list, the tab-separated line template and the
//! case-insensitive substring scan over raw transferred bytes are grounded
//! in `original_source/esqueleto/big_brother.c` and `big_brother.h` (the
//! teacher has no equivalent subsystem — its kernel never logs file I/O).
//! Ported behavior, not ported code: the original builds the match list
//! with `g_slist_prepend` and reverses it before printing; this keeps the
//! configured list order directly instead, since spec.md §4.7 requires
//! configured order in the output and there is no reason to roundtrip
//! through a reversed singly-linked list to get there.

use crate::error::Result;
use crate::volume::Volume;

pub const LOG_FILE_PATH: &str = "/fs.log";

pub const CENSORED_WORDS: [&str; 5] = ["Oldspeak", "English", "revolution", "Emmanuel", "Goldstein"];

fn contains_ascii_case_insensitive(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || haystack.len() < needle.len() {
        return false;
    }
    haystack
        .windows(needle.len())
        .any(|w| w.eq_ignore_ascii_case(needle))
}

/// Censored words found in `buf`, in configured order. Scans the raw bytes
/// including any embedded NULs, matching `big_brother.c`'s `memmem`-style scan.
pub fn scan_censored_words(buf: &[u8]) -> Vec<&'static str> {
    CENSORED_WORDS
        .iter()
        .copied()
        .filter(|word| contains_ascii_case_insensitive(buf, word.as_bytes()))
        .collect()
}

/// Format one log line per spec.md §4.7. The bracket group and its
/// preceding tab are always present in the template; only the group's
/// contents are conditional, so a no-match line still has five tab-separated
/// columns.
pub fn format_line(timestamp: &str, user: &str, path: &str, op: &str, words: &[&str]) -> String {
    let bracket = if words.is_empty() {
        String::new()
    } else {
        format!("[{}]", words.join(", "))
    };
    format!("{}\t{}\t{}\t{}\t{}\t\n", timestamp, user, path, op, bracket)
}

fn current_user() -> String {
    unsafe {
        let ptr = libc::getlogin();
        if ptr.is_null() {
            "unknown".to_string()
        } else {
            std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }
}

/// Append one activity line for a read/write of `buffer` against `path`.
/// Writes through `Volume::pwrite` directly rather than through the
/// dispatcher, so logging a transfer never re-enters C6 (spec.md §4.7's
/// non-recursion invariant). A no-op for transfers against the log file
/// itself.
pub fn log_operation(volume: &mut Volume, path: &str, op: &str, buffer: &[u8]) -> Result<()> {
    if path == LOG_FILE_PATH {
        return Ok(());
    }
    let log_id = volume.ensure_log_file()?;
    let words = scan_censored_words(buffer);
    let timestamp = chrono::Local::now().format("%d-%m-%Y %H:%M").to_string();
    let line = format_line(&timestamp, &current_user(), path, op, &words);

    let mut log_file = volume.tree.get_file(log_id).clone();
    let offset = log_file.file_size() as u64;
    volume.pwrite(&mut log_file, offset, line.as_bytes())?;
    *volume.tree.get_file_mut(log_id) = log_file;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_matches_case_insensitively_and_preserves_order() {
        let found = scan_censored_words(b"we discussed ENGLISH literature and a Revolution");
        assert_eq!(found, vec!["English", "revolution"]);
    }

    #[test]
    fn scan_matches_across_embedded_nul_bytes() {
        let mut buf = b"gold\0stein".to_vec();
        assert!(scan_censored_words(&buf).is_empty());
        buf = b"Goldstein".to_vec();
        assert_eq!(scan_censored_words(&buf), vec!["Goldstein"]);
    }

    #[test]
    fn format_line_omits_bracket_contents_but_keeps_column_count() {
        let line = format_line("31-07-2026 10:00", "alice", "/a.txt", "write", &[]);
        assert_eq!(line, "31-07-2026 10:00\talice\t/a.txt\twrite\t\t\n");
        let tabs = line.matches('\t').count();
        let with_words = format_line("31-07-2026 10:00", "alice", "/a.txt", "write", &["revolution"]);
        assert_eq!(with_words.matches('\t').count(), tabs);
    }
}
