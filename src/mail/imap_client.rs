use crate::config::Config;
use crate::domain::email::EmailRecord;
use crate::mail::decoders::parse_message;
use anyhow::{Context, Result, anyhow};
use native_tls::TlsConnector;

type TlsSession = imap::Session<native_tls::TlsStream<std::net::TcpStream>>;

/// The handful of IMAP operations the fetcher needs.
pub trait MailSession {
    fn select(&mut self, mailbox: &str) -> Result<()>;
    fn uid_search(&mut self, query: &str) -> Result<Vec<u32>>;
    /// Full RFC 822 bytes for one UID, `None` if the server returned nothing.
    fn fetch_rfc822(&mut self, uid: u32) -> Result<Option<Vec<u8>>>;
    fn logout(&mut self) -> Result<()>;
}

/// Anything that can hand the pipeline a batch of fresh records.
pub trait MailSource {
    /// Newest first. Failures surface as an empty batch.
    fn fetch_recent(&self, limit: usize) -> Vec<EmailRecord>;
}

/// Opens an authenticated session.
pub trait MailConnector {
    type Session: MailSession;
    fn connect(&self) -> Result<Self::Session>;
}

/// Plain LOGIN over implicit TLS with a static address / app-password pair.
pub struct ImapConnector {
    pub server: String,
    pub port: u16,
    pub user: String,
    password: String,
}

impl ImapConnector {
    pub fn new(
        server: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            port,
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.settings.imap_server.clone(),
            cfg.settings.imap_port,
            cfg.credentials.email.clone(),
            cfg.credentials.app_password.clone(),
        )
    }
}

impl MailConnector for ImapConnector {
    type Session = TlsSession;

    fn connect(&self) -> Result<TlsSession> {
        let tls = TlsConnector::builder().build()?;
        let client = imap::connect((self.server.as_str(), self.port), self.server.as_str(), &tls)
            .with_context(|| format!("connecting to {}:{}", self.server, self.port))?;

        client
            .login(self.user.as_str(), self.password.as_str())
            .map_err(|(e, _client)| anyhow!("IMAP login failed for {}: {e}", self.user))
    }
}

impl MailSession for TlsSession {
    fn select(&mut self, mailbox: &str) -> Result<()> {
        imap::Session::select(self, mailbox)?;
        Ok(())
    }

    fn uid_search(&mut self, query: &str) -> Result<Vec<u32>> {
        Ok(imap::Session::uid_search(self, query)?.into_iter().collect())
    }

    fn fetch_rfc822(&mut self, uid: u32) -> Result<Option<Vec<u8>>> {
        let fetches = imap::Session::uid_fetch(self, uid.to_string(), "RFC822")?;
        Ok(fetches.iter().next().and_then(|f| f.body()).map(|b| b.to_vec()))
    }

    fn logout(&mut self) -> Result<()> {
        imap::Session::logout(self)?;
        Ok(())
    }
}

/// Pulls the newest primary-inbox messages.
pub struct ImapFetcher<C> {
    connector: C,
    mailbox: String,
    search_query: String,
}

impl<C: MailConnector> ImapFetcher<C> {
    pub fn new(connector: C, mailbox: impl Into<String>, search_query: impl Into<String>) -> Self {
        Self {
            connector,
            mailbox: mailbox.into(),
            search_query: search_query.into(),
        }
    }

    /// Like `fetch_recent` but lets the caller see why nothing came back.
    pub fn try_fetch_recent(&self, limit: usize) -> Result<Vec<EmailRecord>> {
        let mut session = self.connector.connect()?;
        session
            .select(&self.mailbox)
            .with_context(|| format!("selecting {}", self.mailbox))?;

        let mut uids = match session.uid_search(&self.search_query) {
            Ok(uids) => uids,
            Err(e) => {
                log::warn!("search {:?} failed: {e:#}", self.search_query);
                return Ok(Vec::new());
            }
        };
        uids.sort_unstable(); // ascending, newest last

        let newest = newest_first(&uids, limit);
        log::debug!("{} matching messages, fetching {}", uids.len(), newest.len());

        let mut out = Vec::with_capacity(newest.len());
        for uid in newest {
            match session.fetch_rfc822(uid)? {
                Some(raw) => out.push(parse_message(&raw)),
                None => log::warn!("UID {uid} came back without a body; skipping"),
            }
        }

        // the messages are already in hand
        if let Err(e) = session.logout() {
            log::warn!("IMAP logout failed: {e:#}");
        }
        Ok(out)
    }
}

impl<C: MailConnector> MailSource for ImapFetcher<C> {
    /// Any failure is logged and reported as "no mail".
    fn fetch_recent(&self, limit: usize) -> Vec<EmailRecord> {
        match self.try_fetch_recent(limit) {
            Ok(records) => records,
            Err(e) => {
                log::error!("Email fetch failed: {e:#}");
                Vec::new()
            }
        }
    }
}

/// Last `limit` of ascending `uids`, reversed.
fn newest_first(uids: &[u32], limit: usize) -> Vec<u32> {
    let start = uids.len().saturating_sub(limit);
    uids[start..].iter().rev().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Calls {
        fetched: Vec<u32>,
        logged_out: bool,
        refuse_logout: bool,
    }

    struct CannedSession {
        uids: Result<Vec<u32>, String>,
        calls: Rc<RefCell<Calls>>,
    }

    impl MailSession for CannedSession {
        fn select(&mut self, _mailbox: &str) -> Result<()> {
            Ok(())
        }

        fn uid_search(&mut self, _query: &str) -> Result<Vec<u32>> {
            self.uids.clone().map_err(|e| anyhow!(e))
        }

        fn fetch_rfc822(&mut self, uid: u32) -> Result<Option<Vec<u8>>> {
            self.calls.borrow_mut().fetched.push(uid);
            let raw = format!("Subject: message {uid}\r\nFrom: a@example.com\r\n\r\nbody {uid}\r\n");
            Ok(Some(raw.into_bytes()))
        }

        fn logout(&mut self) -> Result<()> {
            let mut calls = self.calls.borrow_mut();
            if calls.refuse_logout {
                return Err(anyhow!("connection reset by peer"));
            }
            calls.logged_out = true;
            Ok(())
        }
    }

    struct CannedConnector {
        uids: Result<Vec<u32>, String>,
        calls: Rc<RefCell<Calls>>,
    }

    impl MailConnector for CannedConnector {
        type Session = CannedSession;
        fn connect(&self) -> Result<CannedSession> {
            Ok(CannedSession {
                uids: self.uids.clone(),
                calls: self.calls.clone(),
            })
        }
    }

    struct RefusingConnector;

    impl MailConnector for RefusingConnector {
        type Session = CannedSession;
        fn connect(&self) -> Result<CannedSession> {
            Err(anyhow!("[AUTHENTICATIONFAILED] Invalid credentials"))
        }
    }

    fn fetcher(uids: Result<Vec<u32>, String>) -> (ImapFetcher<CannedConnector>, Rc<RefCell<Calls>>) {
        let calls = Rc::new(RefCell::new(Calls::default()));
        let connector = CannedConnector {
            uids,
            calls: calls.clone(),
        };
        (ImapFetcher::new(connector, "INBOX", "ALL"), calls)
    }

    #[test]
    fn login_failure_yields_empty_list() {
        let f = ImapFetcher::new(RefusingConnector, "INBOX", "ALL");
        assert!(f.fetch_recent(10).is_empty());
        assert!(f.try_fetch_recent(10).is_err());
    }

    #[test]
    fn search_failure_yields_empty_list() {
        let (f, calls) = fetcher(Err("BAD command".into()));
        assert!(f.try_fetch_recent(10).unwrap().is_empty());
        assert!(calls.borrow().fetched.is_empty());
    }

    #[test]
    fn takes_newest_uids_newest_first() {
        let (f, calls) = fetcher(Ok(vec![7, 3, 12, 5, 9]));
        let records = f.fetch_recent(3);
        assert_eq!(calls.borrow().fetched, vec![12, 9, 7]);
        let subjects: Vec<_> = records.iter().map(|r| r.subject.as_str()).collect();
        assert_eq!(subjects, vec!["message 12", "message 9", "message 7"]);
        assert!(calls.borrow().logged_out);
    }

    #[test]
    fn logout_failure_keeps_fetched_messages() {
        let (f, calls) = fetcher(Ok(vec![1, 2, 3]));
        calls.borrow_mut().refuse_logout = true;
        let records = f.try_fetch_recent(2).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].subject, "message 3");
        assert_eq!(f.fetch_recent(2).len(), 2);
        assert!(!calls.borrow().logged_out);
    }

    #[test]
    fn limit_larger_than_mailbox_takes_everything() {
        assert_eq!(newest_first(&[1, 2], 10), vec![2, 1]);
        assert!(newest_first(&[], 10).is_empty());
    }
}
