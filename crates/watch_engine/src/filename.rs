use sha2::{Digest, Sha256};

const MAX_STEM_CHARS: usize = 48;

/// Record file name for a target: `{readable_id}--{8 hex chars of sha256(id)}.ron`.
///
/// The readable part keeps `[A-Za-z0-9._-]` and maps everything else to `_`; the
/// hash keeps ids that map to the same text apart.
pub fn snapshot_filename(target_id: &str) -> String {
    let digest = Sha256::digest(target_id.as_bytes());
    format!("{}--{}.ron", readable_stem(target_id), hex::encode(&digest[..4]))
}

fn readable_stem(target_id: &str) -> String {
    let mut stem = String::with_capacity(target_id.len().min(MAX_STEM_CHARS));
    for c in target_id.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            c
        } else {
            '_'
        };
        if c == '_' && stem.ends_with('_') {
            continue;
        }
        stem.push(c);
    }
    let stem: String = stem
        .trim_matches(|c| c == '_' || c == '.')
        .chars()
        .take(MAX_STEM_CHARS)
        .collect();
    if stem.is_empty() {
        "target".to_string()
    } else {
        stem
    }
}
