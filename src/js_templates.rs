use crate::renderer::{Predicate, Source};

pub const TAG_ATTRIBUTE: &str = "data-harvest-mark";

/// Escapes a value for a single-quoted JS string literal.
pub fn escape_selector(selector: &str) -> String {
    let mut escaped = String::with_capacity(selector.len());
    for c in selector.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            other => escaped.push(other),
        }
    }
    escaped
}

const IS_VISIBLE: &str = "const style=window.getComputedStyle(el);const rect=el.getBoundingClientRect();return style.display!=='none'&&style.visibility!=='hidden'&&parseFloat(style.opacity||'1')>0&&rect.width>0&&rect.height>0";

pub fn visibility_check(selector: &str, check_visible: bool) -> String {
    let escaped = escape_selector(selector);
    if check_visible {
        format!(
            r#"(function(){{const el=document.querySelector('{}');if(!el)return false;{}}})()"#,
            escaped, IS_VISIBLE
        )
    } else {
        format!(
            r#"(function(){{const el=document.querySelector('{}');if(!el)return true;return !(function(){{{}}})()}})()"#,
            escaped, IS_VISIBLE
        )
    }
}

pub fn presence_check(selector: &str) -> String {
    format!(
        r#"document.querySelector('{}')!==null"#,
        escape_selector(selector)
    )
}

pub fn text_contains(selector: &str, text: &str) -> String {
    format!(
        r#"(function(){{const needle='{}';return Array.from(document.querySelectorAll('{}')).some(el=>(el.innerText||el.textContent||'').includes(needle))}})()"#,
        escape_selector(text),
        escape_selector(selector)
    )
}

pub fn disabled_check(selector: &str) -> String {
    format!(
        r#"(function(){{const el=document.querySelector('{}');if(!el)return true;if(el.disabled||el.getAttribute('aria-disabled')==='true')return true;return !!el.closest('.disabled,[disabled]')}})()"#,
        escape_selector(selector)
    )
}

pub fn stale_check(token: &str) -> String {
    format!(
        r#"document.querySelector('[{}="{}"]')===null"#,
        TAG_ATTRIBUTE,
        escape_selector(token)
    )
}

/// Renders a predicate as a single boolean expression.
pub fn predicate(predicate: &Predicate, current_url_expr: &str) -> String {
    match predicate {
        Predicate::Present { selector } => presence_check(selector),
        Predicate::Visible { selector } => visibility_check(selector, true),
        Predicate::Hidden { selector } => visibility_check(selector, false),
        Predicate::TextContains { selector, text } => text_contains(selector, text),
        Predicate::Disabled { selector } => disabled_check(selector),
        Predicate::UrlChanged { from } => {
            format!("{}!=='{}'", current_url_expr, escape_selector(from))
        }
        Predicate::Stale { token } => stale_check(token),
        Predicate::Any { of } => {
            if of.is_empty() {
                return "false".to_string();
            }
            of.iter()
                .map(|p| format!("({})", self::predicate(p, current_url_expr)))
                .collect::<Vec<_>>()
                .join("||")
        }
    }
}

pub fn click_element(selector: &str) -> String {
    let escaped = escape_selector(selector);
    format!(
        r#"(function(){{const el=document.querySelector('{}');if(!el)return{{found:false}};el.scrollIntoView({{block:'center',behavior:'instant'}});el.click();return{{found:true}}}})()"#,
        escaped
    )
}

pub fn fill_element(selector: &str, text: &str) -> String {
    let escaped = escape_selector(selector);
    let escaped_text = escape_selector(text);
    format!(
        r#"(function(){{const el=document.querySelector('{}');if(!el)return{{found:false}};el.scrollIntoView({{block:'center',behavior:'instant'}});el.focus();el.value='{}';el.dispatchEvent(new Event('input',{{bubbles:true}}));el.dispatchEvent(new Event('change',{{bubbles:true}}));return{{found:true}}}})()"#,
        escaped, escaped_text
    )
}

pub fn tag_element(selector: &str, token: &str) -> String {
    format!(
        r#"(function(){{const el=document.querySelector('{}');if(!el)return{{found:false}};el.setAttribute('{}','{}');return{{found:true}}}})()"#,
        escape_selector(selector),
        TAG_ATTRIBUTE,
        escape_selector(token)
    )
}

pub fn count_elements(selector: &str) -> String {
    format!(
        r#"document.querySelectorAll('{}').length"#,
        escape_selector(selector)
    )
}

/// Reads a value from inside the `index`-th match of `scope`. Evaluates to
/// `null` when nothing matched and throws when the scope element is gone.
pub fn read_within(scope: &str, index: usize, selector: &str, source: &Source) -> String {
    let read = match source {
        Source::Text => {
            "(target.innerText||target.textContent||'').replace(/\\s+/g,' ').trim()".to_string()
        }
        Source::Html => "target.innerHTML".to_string(),
        Source::Attr(name) => format!("target.getAttribute('{}')", escape_selector(name)),
    };
    let target = if selector.is_empty() {
        "root".to_string()
    } else {
        format!("root.querySelector('{}')", escape_selector(selector))
    };
    format!(
        r#"(function(){{const root=document.querySelectorAll('{}')[{}];if(!root)throw new Error('listing {} no longer present');const target={};if(!target)return null;const v={};return v==null?null:String(v)}})()"#,
        escape_selector(scope),
        index,
        index,
        target,
        read
    )
}

pub fn call_function(code: &str, args_json: &str) -> String {
    format!(
        r#"(function(){{const f=({});const a={};return typeof f==='function'?f.apply(null,a):f}})()"#,
        code, args_json
    )
}

pub const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight)";

pub const READY_STATE: &str = "document.readyState";

pub const CURRENT_URL: &str = "window.location.href";

pub const PAGE_HTML: &str = "document.documentElement.outerHTML";
