//! Session lifecycle: one launched browser process plus its open debugging
//! connection, and the conversion pipeline that runs against it.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{Error, Result};
use crate::gate::Gate;
use crate::launcher::{self, BrowserProcess, LaunchConfig};
use crate::protocol::{self, CdpConnection};
use crate::request::{PdfRequest, print_params};

/// A live conversion session.
///
/// Owns the browser process and the protocol connection exclusively; no other
/// component terminates the process or closes the connection. The internal
/// capacity-1 gate keeps concurrent [`convert`](Session::convert) calls from
/// interleaving their navigate/print cycles.
pub struct Session {
    process: Option<BrowserProcess>,
    connection: Arc<CdpConnection>,
    gate: Gate,
}

impl Session {
    /// Launches a headless browser on an ephemeral debugging port and
    /// connects to its first page target.
    ///
    /// On any failure the partially started process is terminated before the
    /// error propagates; a `Session` is never half-initialized.
    pub async fn launch(config: LaunchConfig) -> Result<Self> {
        let (mut process, ws_url) = launcher::launch(&config).await?;

        let parts = match protocol::connect(&ws_url).await {
            Ok(parts) => parts,
            Err(err) => {
                let _ = process.kill().await;
                return Err(err);
            }
        };

        let connection = Arc::new(CdpConnection::new(parts));
        let dispatch = Arc::clone(&connection);
        tokio::spawn(async move { dispatch.run().await });

        debug!(port = process.port, "session established");
        Ok(Self {
            process: Some(process),
            connection,
            gate: Gate::new(1),
        })
    }

    /// Whether the debugging connection is still usable. Flips to false
    /// exactly once, when the browser disconnects, and never back.
    pub fn is_alive(&self) -> bool {
        self.connection.is_alive()
    }

    /// Resolves once the browser disconnects. Returns immediately if it
    /// already has.
    pub async fn disconnected(&self) {
        self.connection.closed().await
    }

    /// Converts one web page to PDF bytes.
    ///
    /// Safe to call from any number of concurrent callers: conversions queue
    /// on the gate and execute one at a time in arrival order. There is no
    /// timeout; a page that never fires its load event suspends this call
    /// until the session goes down.
    pub async fn convert(&self, request: &PdfRequest) -> Result<Vec<u8>> {
        if !self.is_alive() {
            return Err(Error::NotConnected);
        }

        // The permit returns on drop, so neither an error nor a cancelled
        // conversion can starve the queue behind it.
        let _permit = self.gate.acquire().await;
        self.convert_serialized(request).await
    }

    async fn convert_serialized(&self, request: &PdfRequest) -> Result<Vec<u8>> {
        // The session can go down while this call sits in the gate queue.
        if !self.is_alive() {
            return Err(Error::NotConnected);
        }

        self.connection.execute("Page.enable", json!({})).await?;

        // Register before navigating so the load event cannot slip past
        // between the navigate response and the wait.
        let load = self.connection.subscribe_load_event();

        let navigated = self
            .connection
            .execute("Page.navigate", json!({ "url": request.url }))
            .await?;
        if let Some(reason) = navigated
            .get("errorText")
            .and_then(Value::as_str)
            .filter(|reason| !reason.is_empty())
        {
            return Err(Error::Navigation {
                url: request.url.clone(),
                reason: reason.to_string(),
            });
        }

        load.wait().await?;

        let printed = self
            .connection
            .execute("Page.printToPDF", print_params(request)?)
            .await?;
        let payload = printed
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Protocol("printToPDF response carried no payload".into()))?;

        BASE64
            .decode(payload)
            .map_err(|e| Error::Protocol(format!("invalid base64 payload: {e}")))
    }

    /// Tears the session down: closes the protocol connection, then kills
    /// the browser process.
    ///
    /// Consumes the session, so double-dispose is unrepresentable. Process
    /// termination is attempted even when the connection close fails; the
    /// close failure wins as the reported error.
    pub async fn dispose(mut self) -> Result<()> {
        debug!("disposing session");
        let close_result = self.connection.close().await;
        let kill_result = match self.process.as_mut() {
            Some(process) => process.kill().await,
            None => Ok(()),
        };
        close_result?;
        kill_result
    }

    #[cfg(test)]
    fn over(connection: Arc<CdpConnection>) -> Self {
        Self {
            process: None,
            connection,
            gate: Gate::new(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::protocol::fake::{self, FakeController};

    const PDF_BYTES: &[u8] = b"%PDF-1.4 fake document";

    fn fake_session() -> (Arc<Session>, FakeController) {
        let (parts, controller) = fake::transport();
        let connection = Arc::new(CdpConnection::new(parts));
        let dispatch = Arc::clone(&connection);
        tokio::spawn(async move { dispatch.run().await });
        (Arc::new(Session::over(connection)), controller)
    }

    /// Plays the browser side of one full conversion, returning the
    /// `printToPDF` params it observed.
    async fn serve_conversion(controller: &mut FakeController) -> Value {
        let enable = controller.next_sent().await;
        assert_eq!(enable["method"], "Page.enable");
        controller.respond(enable["id"].as_u64().unwrap(), json!({}));

        let navigate = controller.next_sent().await;
        assert_eq!(navigate["method"], "Page.navigate");
        controller.respond(navigate["id"].as_u64().unwrap(), json!({ "frameId": "F1" }));
        controller.fire_event("Page.loadEventFired", json!({ "timestamp": 1.0 }));

        let print = controller.next_sent().await;
        assert_eq!(print["method"], "Page.printToPDF");
        controller.respond(
            print["id"].as_u64().unwrap(),
            json!({ "data": BASE64.encode(PDF_BYTES) }),
        );
        print["params"].clone()
    }

    #[tokio::test]
    async fn letter_conversion_end_to_end() {
        let (session, mut controller) = fake_session();

        let driver = tokio::spawn(async move {
            let params = serve_conversion(&mut controller).await;
            (params, controller)
        });

        let request = PdfRequest {
            format: Some("letter".into()),
            ..PdfRequest::new("https://example.test")
        };
        let bytes = session.convert(&request).await.unwrap();
        assert_eq!(bytes, PDF_BYTES);

        let (params, _controller) = driver.await.unwrap();
        assert_eq!(params["paperWidth"], 8.5);
        assert_eq!(params["paperHeight"], 11.0);
        assert_eq!(params["landscape"], false);
        assert_eq!(params["marginTop"], 0.0);
        assert_eq!(params["pageRanges"], "");
    }

    #[tokio::test]
    async fn concurrent_conversions_do_not_interleave() {
        let (session, mut controller) = fake_session();

        let driver = tokio::spawn(async move {
            let mut methods = Vec::new();
            for _ in 0..2 {
                let enable = controller.next_sent().await;
                methods.push(enable["method"].as_str().unwrap().to_string());
                controller.respond(enable["id"].as_u64().unwrap(), json!({}));

                let navigate = controller.next_sent().await;
                methods.push(navigate["method"].as_str().unwrap().to_string());
                controller.respond(navigate["id"].as_u64().unwrap(), json!({}));
                controller.fire_event("Page.loadEventFired", json!({}));

                let print = controller.next_sent().await;
                methods.push(print["method"].as_str().unwrap().to_string());
                controller.respond(
                    print["id"].as_u64().unwrap(),
                    json!({ "data": BASE64.encode(PDF_BYTES) }),
                );
            }
            (methods, controller)
        });

        let first = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session.convert(&PdfRequest::new("https://a.test")).await
            })
        };
        let second = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session.convert(&PdfRequest::new("https://b.test")).await
            })
        };

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        // The gate forces each conversion's full enable/navigate/print cycle
        // to finish before the next one starts.
        let (methods, _controller) = driver.await.unwrap();
        assert_eq!(
            methods,
            vec![
                "Page.enable",
                "Page.navigate",
                "Page.printToPDF",
                "Page.enable",
                "Page.navigate",
                "Page.printToPDF",
            ]
        );
    }

    #[tokio::test]
    async fn navigate_rejection_surfaces_as_navigation_error() {
        let (session, mut controller) = fake_session();

        let driver = tokio::spawn(async move {
            let enable = controller.next_sent().await;
            controller.respond(enable["id"].as_u64().unwrap(), json!({}));
            let navigate = controller.next_sent().await;
            controller.respond(
                navigate["id"].as_u64().unwrap(),
                json!({ "errorText": "net::ERR_NAME_NOT_RESOLVED" }),
            );
            controller
        });

        let result = session.convert(&PdfRequest::new("https://nope.invalid")).await;
        match result {
            Err(Error::Navigation { url, reason }) => {
                assert_eq!(url, "https://nope.invalid");
                assert!(reason.contains("ERR_NAME_NOT_RESOLVED"));
            }
            other => panic!("expected Navigation error, got {other:?}"),
        }

        // The gate was released on the failure path: a second conversion
        // still goes through.
        let mut controller = driver.await.unwrap();
        let driver = tokio::spawn(async move {
            serve_conversion(&mut controller).await;
            controller
        });
        session
            .convert(&PdfRequest::new("https://example.test"))
            .await
            .unwrap();
        driver.await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_conversion_releases_the_gate() {
        let (session, mut controller) = fake_session();

        let first = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session.convert(&PdfRequest::new("https://a.test")).await
            })
        };
        // The first conversion is mid-flight, suspended on its enable call
        // and holding the gate.
        let enable = controller.next_sent().await;
        assert_eq!(enable["method"], "Page.enable");
        first.abort();
        let _ = first.await;

        // The aborted holder handed its permit back; the next conversion
        // runs to completion instead of queueing forever.
        let driver = tokio::spawn(async move {
            serve_conversion(&mut controller).await;
            controller
        });
        session
            .convert(&PdfRequest::new("https://b.test"))
            .await
            .unwrap();
        driver.await.unwrap();
    }

    #[tokio::test]
    async fn disconnect_while_queued_fails_with_not_connected() {
        let (session, mut controller) = fake_session();

        // Hold the gate so the conversion below has to queue behind it.
        let permit = session.gate.acquire().await;

        let queued = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session.convert(&PdfRequest::new("https://example.test")).await
            })
        };
        // Let it pass the pre-gate liveness check and suspend in the queue.
        tokio::time::sleep(Duration::from_millis(10)).await;

        controller.close_inbound();
        session.disconnected().await;
        assert!(!session.is_alive());

        drop(permit);
        assert!(matches!(
            queued.await.unwrap(),
            Err(Error::NotConnected)
        ));
        // The dead session was detected before any command went out.
        assert!(controller.try_next_sent().is_none());
    }

    #[tokio::test]
    async fn convert_after_disconnect_fails_fast() {
        let (session, controller) = fake_session();
        assert!(session.is_alive());

        drop(controller);
        session.disconnected().await;
        assert!(!session.is_alive());

        assert!(matches!(
            session.convert(&PdfRequest::new("https://example.test")).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn unknown_format_fails_before_printing() {
        let (session, mut controller) = fake_session();

        let driver = tokio::spawn(async move {
            let enable = controller.next_sent().await;
            controller.respond(enable["id"].as_u64().unwrap(), json!({}));
            let navigate = controller.next_sent().await;
            controller.respond(navigate["id"].as_u64().unwrap(), json!({}));
            controller.fire_event("Page.loadEventFired", json!({}));
            controller
        });

        let request = PdfRequest {
            format: Some("tabloid".into()),
            ..PdfRequest::new("https://example.test")
        };
        assert!(matches!(
            session.convert(&request).await,
            Err(Error::UnknownFormat(_))
        ));
        driver.await.unwrap();
    }

    #[tokio::test]
    async fn dispose_closes_connection() {
        let (parts, controller) = fake::transport();
        let connection = Arc::new(CdpConnection::new(parts));
        let dispatch = Arc::clone(&connection);
        tokio::spawn(async move { dispatch.run().await });

        let session = Session::over(connection);
        session.dispose().await.unwrap();
        drop(controller);
    }
}
