//! Page scripts evaluated by [`super::ChromePage`].

use crate::canvas::CANVAS_TEXT_GLOBAL;

pub const SCROLL_HEIGHT: &str =
    "(() => Math.round((document.body && document.body.scrollHeight) || 0))()";

pub const PAGE_META: &str = r"(() => {
  const h = document.querySelector('h1, h2');
  const heading = h ? (h.innerText || h.textContent || '').trim() : '';
  return { heading: heading || null, url: location.href, origin: location.origin };
})()";

/// JSON string literal usable inside a script.
fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

pub fn scroll_by(dy: u32) -> String {
    format!("(() => {{ window.scrollBy(0, {dy}); return true; }})()")
}

pub fn selector_present(selector: &str) -> String {
    format!("!!document.querySelector({})", js_string(selector))
}

pub fn count_cards(selector: &str) -> String {
    format!("document.querySelectorAll({}).length", js_string(selector))
}

pub fn click_load_more(labels: &[String]) -> String {
    let labels = serde_json::to_string(labels).unwrap_or_else(|_| "[]".to_string());
    format!(
        r"(() => {{
  const labels = {labels}.map(l => l.toLowerCase());
  const candidates = Array.from(document.querySelectorAll('button, div.container-button, a'));
  const btn = candidates.find(el => {{
    if (el.offsetParent === null) return false;
    const text = (el.innerText || '').replace(/\s+/g, ' ').trim().toLowerCase();
    return text && labels.some(l => text.includes(l));
  }});
  if (!btn) return false;
  try {{ btn.scrollIntoView({{ block: 'center' }}); }} catch (_) {{}}
  btn.click();
  return true;
}})()"
    )
}

/// Resolves once the resource count has been stable for half a second, or
/// with `false` after `timeout_ms`.
pub fn wait_for_idle(timeout_ms: u64) -> String {
    format!(
        r"(async () => {{
  const timeoutMs = {timeout_ms};
  const idleMs = 500;
  const interval = 100;
  const count = () => {{ try {{ return performance.getEntriesByType('resource').length; }} catch (_) {{ return 0; }} }};
  const start = Date.now();
  let last = count();
  let stable = 0;
  while (Date.now() - start < timeoutMs) {{
    await new Promise(r => setTimeout(r, interval));
    const cur = count();
    if (document.readyState === 'complete' && cur === last) {{
      stable += interval;
      if (stable >= idleMs) return true;
    }} else {{
      stable = 0;
    }}
    last = cur;
  }}
  return false;
}})()"
    )
}

pub fn apply_sort(label: &str) -> String {
    let label = js_string(label);
    format!(
        r"(async () => {{
  const toggle = document.querySelector('.order-list .dropdown-toggle');
  if (!toggle) return false;
  toggle.click();
  await new Promise(r => setTimeout(r, 400));
  const wanted = {label}.toLowerCase();
  const entry = Array.from(document.querySelectorAll('.dropdown-menu span, .dropdown-menu a, .dropdown-menu li'))
    .find(el => (el.innerText || '').trim().toLowerCase().includes(wanted));
  if (!entry) return false;
  entry.click();
  return true;
}})()"
    )
}

pub fn snapshot_cards(selector: &str) -> String {
    let selector = js_string(selector);
    format!(
        r#"(() => {{
  const table = window['{CANVAS_TEXT_GLOBAL}'];
  const STOCK_SCOPE = '.stock-container, [class*="stock"]';
  return Array.from(document.querySelectorAll({selector})).map(card => ({{
    html: card.outerHTML || '',
    text: (card.innerText || '').replace(/\s+/g, ' ').trim(),
    canvases: Array.from(card.querySelectorAll('canvas')).map(c => {{
      const scope = c.closest(STOCK_SCOPE);
      return {{
        texts: (table && table.get(c)) || [],
        stock_scoped: !!scope && card.contains(scope),
      }};
    }}),
  }}));
}})()"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_are_escaped() {
        assert_eq!(
            count_cards(r#"[data-x="a"]"#),
            r#"document.querySelectorAll("[data-x=\"a\"]").length"#
        );
    }

    #[test]
    fn load_more_labels_are_embedded_as_json() {
        let script = click_load_more(&["Mostrar más productos".to_string()]);
        assert!(script.contains(r#"["Mostrar más productos"]"#));
    }

    #[test]
    fn snapshot_reads_canvas_side_table() {
        let script = snapshot_cards(".product-card");
        assert!(script.contains(CANVAS_TEXT_GLOBAL));
        assert!(script.contains("stock_scoped"));
    }
}
