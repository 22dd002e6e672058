use sha2::{Digest, Sha256};

use crate::utils::truncate_chars;

/// 文件名中保留的最大字符数
const MAX_STEM_CHARS: usize = 50;
const HASH_SUFFIX_LEN: usize = 8;

/// 非字母数字和 `-_.` 的字符替换为下划线
pub fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// 截断后的目录名加原名哈希的后 8 位，长目录名截断后也不会冲突
pub fn output_stem(document_id: &str) -> String {
    let sanitized = sanitize_component(document_id);
    let digest = format!("{:x}", Sha256::digest(document_id.as_bytes()));
    let hash_tail = &digest[digest.len() - HASH_SUFFIX_LEN..];
    format!("{}_{}", truncate_chars(&sanitized, MAX_STEM_CHARS), hash_tail)
}

pub fn output_file_name(document_id: &str, suffix: &str) -> String {
    format!("{}{}", output_stem(document_id), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_path_separators_and_spaces() {
        assert_eq!(sanitize_component("a/b c:d"), "a_b_c_d");
        assert_eq!(sanitize_component("聚合物-1.pdf"), "聚合物-1.pdf");
    }

    #[test]
    fn names_are_deterministic_and_bounded() {
        let long = "x".repeat(120);
        let first = output_file_name(&long, "_structure_property.json");
        let second = output_file_name(&long, "_structure_property.json");
        assert_eq!(first, second);
        assert_eq!(output_stem(&long).chars().count(), MAX_STEM_CHARS + 1 + HASH_SUFFIX_LEN);
        assert!(first.ends_with("_structure_property.json"));
    }

    #[test]
    fn shared_prefix_does_not_collide() {
        let base = "y".repeat(60);
        assert_ne!(output_stem(&format!("{}A", base)), output_stem(&format!("{}B", base)));
    }
}
