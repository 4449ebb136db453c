use std::future::Future;
use std::sync::Arc;

use async_imap::types::{Fetch, Flag};
use async_imap::Session;
use chrono::{Duration, Utc};
use futures::TryStreamExt;
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use super::mime::parse_message;
use super::{MailboxBatch, MailboxError, MailboxGateway, MessageId};
use crate::config::MailboxConfig;

type ImapSession = Session<TlsStream<TcpStream>>;

/// IMAP-over-TLS mailbox exposed through the synchronous [`MailboxGateway`] seam.
///
/// Every call connects, authenticates, selects the mailbox, does its work and
/// logs out again; no session outlives a call.
pub struct ImapMailboxClient {
    config: MailboxConfig,
    tls: TlsConnector,
    runtime: Option<Runtime>,
}

impl ImapMailboxClient {
    pub fn new(config: MailboxConfig, runtime: Runtime) -> Self {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Self {
            config,
            tls: TlsConnector::from(Arc::new(tls_config)),
            runtime: Some(runtime),
        }
    }

    pub fn with_runtime(config: MailboxConfig) -> Result<Self, MailboxError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| MailboxError::Runtime(err.to_string()))?;
        Ok(Self::new(config, runtime))
    }

    fn block_on<F: Future>(&self, future: F) -> Result<F::Output, MailboxError> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| MailboxError::Runtime("mailbox runtime already shut down".to_string()))?;
        Ok(runtime.block_on(future))
    }

    async fn bounded<T, E, F>(&self, operation: &'static str, future: F) -> Result<T, MailboxError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<MailboxError>,
    {
        match tokio::time::timeout(self.config.timeout, future).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(MailboxError::Timeout { operation }),
        }
    }

    async fn open_session(&self) -> Result<ImapSession, MailboxError> {
        let address = (self.config.host.as_str(), self.config.port);
        let tcp = self
            .bounded("connect", async { TcpStream::connect(address).await })
            .await?;

        let server_name = ServerName::try_from(self.config.host.clone())
            .map_err(|err| MailboxError::Tls(err.to_string()))?;
        let stream = self
            .bounded("tls", async {
                self.tls
                    .connect(server_name, tcp)
                    .await
                    .map_err(|err| MailboxError::Tls(err.to_string()))
            })
            .await?;

        let client = async_imap::Client::new(stream);
        let mut session = self
            .bounded("login", async {
                client
                    .login(&self.config.username, &self.config.password)
                    .await
                    .map_err(|(err, _)| MailboxError::Authentication(err.to_string()))
            })
            .await?;

        self.bounded("select", async {
            session.select(&self.config.mailbox).await.map_err(protocol)
        })
        .await?;

        Ok(session)
    }

    async fn close_session(&self, mut session: ImapSession) {
        let outcome = self
            .bounded("logout", async { session.logout().await.map_err(protocol) })
            .await;
        if let Err(err) = outcome {
            debug!(error = %err, "mailbox logout failed");
        }
    }

    async fn fetch_batch(
        &self,
        session: &mut ImapSession,
        since_days: u32,
        only_unread: bool,
    ) -> Result<MailboxBatch, MailboxError> {
        let query = search_query(since_days, only_unread);
        let mut uids: Vec<u32> = self
            .bounded("search", async {
                session.uid_search(&query).await.map_err(protocol)
            })
            .await?
            .into_iter()
            .collect();
        uids.sort_unstable();

        let mut batch = MailboxBatch::default();
        if uids.is_empty() {
            return Ok(batch);
        }

        let uid_set = uids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let fetches: Vec<Fetch> = self
            .bounded("fetch", async {
                let stream = session
                    .uid_fetch(&uid_set, "(UID FLAGS BODY.PEEK[])")
                    .await
                    .map_err(protocol)?;
                stream.try_collect::<Vec<Fetch>>().await.map_err(protocol)
            })
            .await?;

        for fetch in &fetches {
            let uid = fetch.uid.unwrap_or(fetch.message);
            let Some(raw) = fetch.body() else {
                warn!(uid, "message has no body, skipping");
                batch.skipped.push(format!("uid:{uid}: empty body"));
                continue;
            };
            let unread = !fetch.flags().any(|flag| matches!(flag, Flag::Seen));

            match parse_message(raw, uid, unread) {
                Ok(message) => batch.messages.push(message),
                Err(err) => {
                    warn!(uid, error = %err, "failed to parse message, skipping");
                    batch.skipped.push(format!("uid:{uid}: {err}"));
                }
            }
        }

        Ok(batch)
    }

    async fn flag_seen(
        &self,
        session: &mut ImapSession,
        id: &MessageId,
    ) -> Result<bool, MailboxError> {
        let query = match id.as_uid() {
            Some(uid) => format!("UID {uid}"),
            None => format!("HEADER Message-ID \"{}\"", sanitize_quoted(&id.0)),
        };

        let matches = self
            .bounded("search", async {
                session.uid_search(&query).await.map_err(protocol)
            })
            .await?;
        if matches.len() != 1 {
            debug!(message_id = %id, found = matches.len(), "message no longer resolves uniquely");
            return Ok(false);
        }

        let uid = matches.into_iter().next().unwrap_or_default();
        self.bounded("store", async {
            let stream = session
                .uid_store(uid.to_string(), "+FLAGS (\\Seen)")
                .await
                .map_err(protocol)?;
            stream.try_collect::<Vec<Fetch>>().await.map_err(protocol)
        })
        .await?;

        Ok(true)
    }
}

impl MailboxGateway for ImapMailboxClient {
    fn fetch(&self, since_days: u32, only_unread: bool) -> Result<MailboxBatch, MailboxError> {
        self.block_on(async {
            let mut session = self.open_session().await?;
            let result = self.fetch_batch(&mut session, since_days, only_unread).await;
            self.close_session(session).await;
            result
        })?
    }

    fn mark_consumed(&self, id: &MessageId) -> Result<bool, MailboxError> {
        self.block_on(async {
            let mut session = self.open_session().await?;
            let result = self.flag_seen(&mut session, id).await;
            self.close_session(session).await;
            result
        })?
    }
}

// Dropping a runtime from inside an async context panics.
impl Drop for ImapMailboxClient {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for ImapMailboxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapMailboxClient")
            .field("host", &self.config.host)
            .field("mailbox", &self.config.mailbox)
            .finish_non_exhaustive()
    }
}

fn protocol(err: async_imap::error::Error) -> MailboxError {
    MailboxError::Protocol(err.to_string())
}

fn search_query(since_days: u32, only_unread: bool) -> String {
    let since = (Utc::now() - Duration::days(i64::from(since_days))).date_naive();
    let date = since.format("%d-%b-%Y");
    if only_unread {
        format!("UNSEEN SINCE {date}")
    } else {
        format!("SINCE {date}")
    }
}

fn sanitize_quoted(value: &str) -> String {
    value.chars().filter(|c| *c != '"' && *c != '\\').collect()
}
