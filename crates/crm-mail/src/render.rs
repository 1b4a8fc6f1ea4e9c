//! Plain-text to HTML body rendering.

/// Content id of the inline signature image.
pub const SIGNATURE_CID: &str = "signature_img";

/// Render a plain-text body as HTML: escape markup, turn newlines into
/// `<br>`, and append the signature image when `signature_cid` is given.
pub fn render_html(text: &str, signature_cid: Option<&str>) -> String {
    let mut html = String::with_capacity(text.len() + 128);
    for ch in text.chars() {
        match ch {
            '&' => html.push_str("&amp;"),
            '<' => html.push_str("&lt;"),
            '>' => html.push_str("&gt;"),
            '"' => html.push_str("&quot;"),
            '\r' => {}
            '\n' => html.push_str("<br>"),
            c => html.push(c),
        }
    }
    if let Some(cid) = signature_cid {
        html.push_str("<br><br>\n");
        html.push_str(&format!(
            r#"<img src="cid:{}" alt="Signature" style="width:300px; height:auto;" />"#,
            cid
        ));
    }
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newlines_become_breaks() {
        assert_eq!(render_html("Hi John,\nThanks.", None), "Hi John,<br>Thanks.");
        assert_eq!(render_html("a\r\nb", None), "a<br>b");
    }

    #[test]
    fn test_markup_is_escaped() {
        assert_eq!(
            render_html("<script>alert(\"x\")</script> & co", None),
            "&lt;script&gt;alert(&quot;x&quot;)&lt;/script&gt; &amp; co"
        );
    }

    #[test]
    fn test_signature_is_appended() {
        let html = render_html("Best", Some(SIGNATURE_CID));
        assert!(html.starts_with("Best<br><br>"));
        assert!(html.contains(r#"src="cid:signature_img""#));
    }
}
