//! In-page scripts. String arguments are embedded as JSON literals.

#![cfg_attr(not(feature = "browser"), allow(dead_code))]

use crate::models::{DocumentKey, FileType};

/// Resolves once the document is interactive, or after 10s.
pub const WAIT_FOR_READY: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
            setTimeout(() => resolve('timeout'), 10000);
        }
    })
"#;

pub const CLEAR_LOGIN_FIELDS: &str = r#"
    (() => {
        for (const id of ['Inscricao', 'Senha']) {
            const el = document.getElementById(id);
            if (el) { el.value = ''; }
        }
        return true;
    })()
"#;

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Fill `#datainicio`/`#datafim` and submit. Evaluates to whether both fields exist.
pub fn date_filter(start: &str, end: &str) -> String {
    format!(
        r#"
    (() => {{
        const start = document.querySelector('#datainicio');
        const end = document.querySelector('#datafim');
        if (!start || !end) {{ return false; }}
        for (const [el, value] of [[start, {start}], [end, {end}]]) {{
            el.value = value;
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
        }}
        const submit = document.querySelector('button[type="submit"].btn.btn-primary')
            || document.querySelector('button[type="submit"]');
        if (submit) {{ submit.click(); }} else if (start.form) {{ start.form.submit(); }}
        return true;
    }})()
"#,
        start = js_string(start),
        end = js_string(end),
    )
}

/// Click the `index`-th anchor if it is still the expected, visible control.
pub fn click_anchor(index: usize, expected_href: Option<&str>) -> String {
    let expected = expected_href.map(js_string).unwrap_or_else(|| "null".to_string());
    format!(
        r#"
    (() => {{
        const anchor = document.querySelectorAll('a')[{index}];
        if (!anchor) {{ return false; }}
        const expected = {expected};
        if (expected !== null && anchor.getAttribute('href') !== expected) {{ return false; }}
        if (anchor.offsetParent === null) {{ return false; }}
        anchor.click();
        return true;
    }})()
"#
    )
}

/// Click the in-page download control for a key.
pub fn click_download(key: &DocumentKey, file_type: FileType) -> String {
    let fragment = format!("/Download/{}/{}", file_type.download_segment(), key);
    format!(
        r#"
    (() => {{
        const fragment = {fragment};
        const anchor = Array.from(document.querySelectorAll('a[href]'))
            .find((a) => a.getAttribute('href').includes(fragment));
        if (!anchor) {{ return false; }}
        anchor.click();
        return true;
    }})()
"#,
        fragment = js_string(&fragment),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_are_quoted() {
        let script = click_anchor(4, Some("?pg=2'\""));
        assert!(script.contains("querySelectorAll('a')[4]"));
        assert!(script.contains(r#""?pg=2'\"""#));

        let script = click_anchor(0, None);
        assert!(script.contains("const expected = null;"));
    }

    #[test]
    fn test_download_fragment() {
        let key = DocumentKey::parse(&"3".repeat(44)).unwrap();
        let script = click_download(&key, FileType::Rendered);
        assert!(script.contains(&format!("/Download/DANFSe/{}", key)));
    }
}
