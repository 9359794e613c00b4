//! Output cleanup for captured job output.
//!
//! Jobs can print arbitrarily much (`find /`, a chatty build). Middle-omission
//! keeps both the beginning (what the job was doing) and the end (its final
//! result or error) when the output is logged or returned to API clients.

/// Default maximum characters before truncation kicks in (30 000).
pub const DEFAULT_MAX_CHARS: usize = 30_000;

/// Truncate `output` to at most `max_chars` characters using middle-omission.
///
/// ```text
/// <first max_chars/2 chars>
///
/// ... [OUTPUT TRUNCATED: N chars omitted] ...
///
/// <last max_chars/2 chars>
/// ```
///
/// Splits on character boundaries, never inside a multi-byte sequence.
pub fn truncate_output(output: &str, max_chars: usize) -> String {
    if output.len() <= max_chars {
        return output.to_owned();
    }

    let total = output.chars().count();
    if total <= max_chars {
        return output.to_owned();
    }

    let half = max_chars / 2;
    let head: String = output.chars().take(half).collect();
    let tail: String = output.chars().skip(total - half).collect();
    let omitted = total - half * 2;

    format!("{head}\n\n... [OUTPUT TRUNCATED: {omitted} chars omitted] ...\n\n{tail}")
}

/// Strip ANSI escapes (colour codes from job tooling) and truncate.
pub fn clean_output(raw: &str, max_chars: usize) -> String {
    let stripped = strip_ansi_escapes::strip(raw.as_bytes());
    truncate_output(&String::from_utf8_lossy(&stripped), max_chars)
}
