//! Natural ("human") ordering of entry names.

use std::cmp::Ordering;

use unicode_normalization::UnicodeNormalization;

/// Compares two names the way a file browser lists them.
///
/// Runs of ASCII digits compare by numeric value (`img2 < img10`), all
/// other characters compare case-insensitively after NFC normalisation.
/// Names equal under those rules fall back to a byte comparison, so the
/// order is total and two distinct names never compare `Equal`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let ka = fold(a);
    let kb = fold(b);
    compare_folded(&ka, &kb).then_with(|| a.cmp(b))
}

fn fold(s: &str) -> Vec<char> {
    s.nfc().flat_map(char::to_lowercase).collect()
}

fn compare_folded(a: &[char], b: &[char]) -> Ordering {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            let (run_a, next_i) = digit_run(a, i);
            let (run_b, next_j) = digit_run(b, j);
            let ord = compare_numeric(run_a, run_b);
            if ord != Ordering::Equal {
                return ord;
            }
            i = next_i;
            j = next_j;
            continue;
        }
        match a[i].cmp(&b[j]) {
            Ordering::Equal => {
                i += 1;
                j += 1;
            }
            other => return other,
        }
    }
    (a.len() - i).cmp(&(b.len() - j))
}

fn digit_run(s: &[char], start: usize) -> (&[char], usize) {
    let end = s[start..]
        .iter()
        .position(|c| !c.is_ascii_digit())
        .map_or(s.len(), |p| start + p);
    (&s[start..end], end)
}

/// Compares digit runs by value without parsing, so arbitrarily long
/// runs cannot overflow.
fn compare_numeric(a: &[char], b: &[char]) -> Ordering {
    let a = strip_zeros(a);
    let b = strip_zeros(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn strip_zeros(run: &[char]) -> &[char] {
    let first = run.iter().position(|c| *c != '0').unwrap_or(run.len());
    &run[first..]
}
