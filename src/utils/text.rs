//! 文本相关的安全工具函数
//!
//! UTF-8 安全的截断预览，以及嵌入 HTML 时的转义。

/// 按字符安全截断字符串，若超过则追加省略号
///
/// - `input`: 待处理文本
/// - `max_chars`: 最大字符数
/// - 返回处理后的新字符串
pub fn safe_truncate(input: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }

    let mut result = String::with_capacity(max_chars.min(input.len()) + 3);
    let mut iter = input.chars();

    for _ in 0..max_chars {
        match iter.next() {
            Some(ch) => result.push(ch),
            None => return result,
        }
    }

    if iter.next().is_some() {
        result.push_str("...");
    }

    result
}

/// 单行预览：换行替换为空格后截断
pub fn single_line_preview(input: &str, max_chars: usize) -> String {
    let flattened: String = input
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    safe_truncate(&flattened, max_chars)
}

/// HTML 转义（不处理 `$`，保持公式分隔符原样）
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// 转义后把换行转为 `<br>`
pub fn text_to_html(input: &str) -> String {
    escape_html(&input.replace("\r\n", "\n").replace('\r', "\n")).replace('\n', "<br>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_truncate_multibyte() {
        assert_eq!(safe_truncate("一元二次方程", 4), "一元二次...");
        assert_eq!(safe_truncate("abc", 5), "abc");
        assert_eq!(safe_truncate("abc", 0), "");
    }

    #[test]
    fn test_text_to_html_keeps_delimiters() {
        assert_eq!(
            text_to_html("若 $a<b$\r\n则 <b>"),
            "若 $a&lt;b$<br>则 &lt;b&gt;"
        );
    }

    #[test]
    fn test_single_line_preview() {
        assert_eq!(single_line_preview("a\nb", 10), "a b");
    }
}
