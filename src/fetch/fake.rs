//! In-memory [`Transfer`] for tests.

use super::{Transfer, TransferError, TransferErrorKind};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Route {
    /// Payloads served in order; the last one repeats.
    payloads: Vec<Vec<u8>>,
    served: usize,
    failures_left: usize,
    calls: usize,
}

/// Serves canned payloads per URL and records every call.
///
/// Unknown URLs fail with [`TransferErrorKind::NotFound`].
#[derive(Clone, Default)]
pub struct FakeTransfer {
    routes: Arc<Mutex<HashMap<String, Route>>>,
}

impl FakeTransfer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `payload` for every download of `url`.
    ///
    /// # Panics
    ///
    /// Panics if the routes mutex is poisoned.
    pub fn serve(&self, url: &str, payload: impl Into<Vec<u8>>) {
        self.serve_sequence(url, vec![payload.into()]);
    }

    /// Serve `payloads` one per download of `url`, repeating the last one.
    ///
    /// # Panics
    ///
    /// Panics if the routes mutex is poisoned.
    pub fn serve_sequence(&self, url: &str, payloads: Vec<Vec<u8>>) {
        let mut routes = self.routes.lock().expect("routes mutex poisoned");
        let route = routes.entry(url.to_string()).or_default();
        route.payloads = payloads;
        route.served = 0;
    }

    /// Make the next `times` downloads of `url` fail with a network error.
    ///
    /// # Panics
    ///
    /// Panics if the routes mutex is poisoned.
    pub fn fail_times(&self, url: &str, times: usize) {
        self.routes
            .lock()
            .expect("routes mutex poisoned")
            .entry(url.to_string())
            .or_default()
            .failures_left = times;
    }

    /// Number of download calls made for `url`, failed ones included.
    ///
    /// # Panics
    ///
    /// Panics if the routes mutex is poisoned.
    #[must_use]
    pub fn downloads(&self, url: &str) -> usize {
        self.routes
            .lock()
            .expect("routes mutex poisoned")
            .get(url)
            .map_or(0, |route| route.calls)
    }

    /// Total download calls across all URLs.
    ///
    /// # Panics
    ///
    /// Panics if the routes mutex is poisoned.
    #[must_use]
    pub fn total_downloads(&self) -> usize {
        self.routes
            .lock()
            .expect("routes mutex poisoned")
            .values()
            .map(|route| route.calls)
            .sum()
    }
}

impl Transfer for FakeTransfer {
    fn download(&self, url: &str, dest: &Path) -> Result<(), TransferError> {
        let payload = {
            let mut routes = self.routes.lock().expect("routes mutex poisoned");
            let Some(route) = routes.get_mut(url) else {
                return Err(TransferError::new(url, TransferErrorKind::NotFound, "no route"));
            };
            route.calls += 1;
            if route.failures_left > 0 {
                route.failures_left -= 1;
                return Err(TransferError::new(
                    url,
                    TransferErrorKind::Network,
                    "injected failure",
                ));
            }
            let Some(last) = route.payloads.len().checked_sub(1) else {
                return Err(TransferError::new(url, TransferErrorKind::NotFound, "no payload"));
            };
            let payload = route.payloads[route.served.min(last)].clone();
            route.served += 1;
            payload
        };
        fs::write(dest, payload).map_err(|err| TransferError::io(url, &err))
    }
}
