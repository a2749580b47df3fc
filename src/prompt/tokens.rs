//! Token 估算（简单的字符计数近似），用于截断观察文本

/// Token 估算器
pub struct TokenEstimator;

impl TokenEstimator {
    /// 估算文本的 token 数量
    /// 使用简单的启发式规则：英文约 4 字符/token，中文约 1.5 字符/token
    pub fn estimate(text: &str) -> usize {
        let mut ascii_chars = 0;
        let mut non_ascii_chars = 0;

        for c in text.chars() {
            if c.is_ascii() {
                ascii_chars += 1;
            } else {
                non_ascii_chars += 1;
            }
        }

        let tokens = ascii_chars / 4 + (non_ascii_chars as f64 / 1.5).ceil() as usize;
        tokens.max(1)
    }

    fn char_cost(c: char) -> f64 {
        if c.is_ascii() {
            0.25
        } else {
            1.0 / 1.5
        }
    }

    /// 保留开头部分，使估算 token 数不超过 `max_tokens`；0 表示不截断
    pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> &str {
        if max_tokens == 0 {
            return text;
        }
        let budget = max_tokens as f64;
        let mut used = 0.0;
        for (idx, c) in text.char_indices() {
            used += Self::char_cost(c);
            if used > budget {
                return &text[..idx];
            }
        }
        text
    }
}
