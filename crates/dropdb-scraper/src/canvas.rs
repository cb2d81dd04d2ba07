//! Canvas text capture.
//!
//! Some storefronts draw values (stock counts in particular) onto a
//! `<canvas>` instead of emitting DOM text. The init script wraps
//! `fillText` and `strokeText` so every drawn string is recorded in a
//! per-canvas side table that [`crate::browser`] reads back when it
//! snapshots cards. Drawing behavior is unchanged.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::error::ScraperError;
use crate::page::ScriptHost;

/// Global under which the side table lives in the page.
pub const CANVAS_TEXT_GLOBAL: &str = "__dropdbCanvasText";

/// Marker set on wrapped prototype methods.
pub const CANVAS_WRAP_MARKER: &str = "__dropdbCaptured";

/// Runs before any page script. Re-running it in the same realm is a no-op.
pub const CANVAS_CAPTURE_SCRIPT: &str = r#"(() => {
  try {
    const TABLE = '__dropdbCanvasText';
    const MARKER = '__dropdbCaptured';
    if (!window[TABLE]) {
      Object.defineProperty(window, TABLE, { value: new WeakMap(), enumerable: false });
    }
    const table = window[TABLE];
    const record = (ctx, text) => {
      const canvas = ctx && ctx.canvas;
      if (!canvas) return;
      const s = String(text ?? '').trim();
      if (!s) return;
      let buf = table.get(canvas);
      if (!buf) { buf = []; table.set(canvas, buf); }
      buf.push(s);
    };
    const wrap = (proto, name) => {
      const original = proto && proto[name];
      if (!original || original[MARKER]) return;
      const wrapped = function (...args) {
        try { record(this, args[0]); } catch (_) {}
        return original.apply(this, args);
      };
      Object.defineProperty(wrapped, MARKER, { value: true });
      proto[name] = wrapped;
    };
    for (const proto of [
      window.CanvasRenderingContext2D && CanvasRenderingContext2D.prototype,
      window.OffscreenCanvasRenderingContext2D && OffscreenCanvasRenderingContext2D.prototype,
    ]) {
      wrap(proto, 'fillText');
      wrap(proto, 'strokeText');
    }
  } catch (_) {}
})();"#;

/// Installs [`CANVAS_CAPTURE_SCRIPT`] at most once per browsing context.
#[derive(Debug, Default)]
pub struct CanvasInterceptor {
    installed: Mutex<HashSet<String>>,
}

impl CanvasInterceptor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the script was registered by this call, `false` if
    /// the context already had it.
    ///
    /// # Errors
    ///
    /// Propagates the host's failure to register the script; the context is
    /// then left unmarked so a later call can retry.
    pub async fn install<H>(&self, host: &H) -> Result<bool, ScraperError>
    where
        H: ScriptHost + ?Sized,
    {
        let context = host.context_id();
        {
            let mut installed = self
                .installed
                .lock()
                .map_err(|_| ScraperError::Browser("canvas interceptor lock poisoned".into()))?;
            if !installed.insert(context.clone()) {
                return Ok(false);
            }
        }

        if let Err(err) = host.add_init_script(CANVAS_CAPTURE_SCRIPT).await {
            if let Ok(mut installed) = self.installed.lock() {
                installed.remove(&context);
            }
            return Err(err);
        }
        tracing::debug!(context = %context, "canvas text capture installed");
        Ok(true)
    }

    /// Forgets a closed context.
    pub fn release(&self, context_id: &str) {
        if let Ok(mut installed) = self.installed.lock() {
            installed.remove(context_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    struct Host {
        id: &'static str,
        registered: AtomicUsize,
        fail: bool,
    }

    impl Host {
        fn new(id: &'static str) -> Self {
            Self {
                id,
                registered: AtomicUsize::new(0),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl ScriptHost for Host {
        fn context_id(&self) -> String {
            self.id.to_string()
        }

        async fn add_init_script(&self, source: &str) -> Result<(), ScraperError> {
            assert!(source.contains(CANVAS_WRAP_MARKER));
            if self.fail {
                return Err(ScraperError::Browser("target closed".into()));
            }
            self.registered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn installs_once_per_context() {
        let interceptor = CanvasInterceptor::new();
        let host = Host::new("ctx-1");
        assert!(interceptor.install(&host).await.unwrap());
        assert!(!interceptor.install(&host).await.unwrap());
        assert_eq!(host.registered.load(Ordering::SeqCst), 1);

        let other = Host::new("ctx-2");
        assert!(interceptor.install(&other).await.unwrap());
        assert_eq!(other.registered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_install_can_be_retried() {
        let interceptor = CanvasInterceptor::new();
        let mut host = Host::new("ctx-1");
        host.fail = true;
        assert!(interceptor.install(&host).await.is_err());
        host.fail = false;
        assert!(interceptor.install(&host).await.unwrap());
    }

    #[tokio::test]
    async fn release_allows_reinstall() {
        let interceptor = CanvasInterceptor::new();
        let host = Host::new("ctx-1");
        interceptor.install(&host).await.unwrap();
        interceptor.release("ctx-1");
        assert!(interceptor.install(&host).await.unwrap());
        assert_eq!(host.registered.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn script_guards_against_double_wrapping() {
        assert!(CANVAS_CAPTURE_SCRIPT.contains(CANVAS_TEXT_GLOBAL));
        assert!(CANVAS_CAPTURE_SCRIPT.contains("original[MARKER]"));
        assert!(CANVAS_CAPTURE_SCRIPT.contains("'fillText'"));
        assert!(CANVAS_CAPTURE_SCRIPT.contains("'strokeText'"));
    }
}
