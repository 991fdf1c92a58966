use anyhow::{Result, anyhow};
use minijinja::{Environment, context};
use std::sync::Arc;
use tiny_http::{Header, Method, Response, Server};

use crate::classify::Classifier;
use crate::mail::imap_client::MailSource;
use crate::pipeline::Pipeline;
use crate::store::repo::EmailRepository;

const INDEX_TEMPLATE: &str = include_str!("../../templates/index.html");

#[derive(Debug)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Reply {
    fn html(body: String) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body,
        }
    }

    fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.into(),
        }
    }

    fn into_response(self) -> Result<Response<std::io::Cursor<Vec<u8>>>> {
        let header = Header::from_bytes(&b"Content-Type"[..], self.content_type.as_bytes())
            .map_err(|_| anyhow!("bad content type {}", self.content_type))?;
        Ok(Response::from_string(self.body)
            .with_status_code(self.status)
            .with_header(header))
    }
}

pub struct App<S, C, R> {
    pipeline: Pipeline<S, C>,
    repo: R,
    fetch_limit: usize,
    templates: Environment<'static>,
}

impl<S: MailSource, C: Classifier, R: EmailRepository> App<S, C, R> {
    pub fn new(pipeline: Pipeline<S, C>, repo: R, fetch_limit: usize) -> Result<Self> {
        let mut templates = Environment::new();
        templates.add_template("index.html", INDEX_TEMPLATE)?;
        Ok(Self {
            pipeline,
            repo,
            fetch_limit,
            templates,
        })
    }

    /// Route one request. Errors become a 500 with the error text.
    pub fn handle(&mut self, method: &Method, url: &str) -> Reply {
        let path = url.split('?').next().unwrap_or("/");
        let result = match (method, path) {
            (Method::Get, "/") => self.index(),
            (Method::Get, "/cleardb") => self.clear(),
            (_, "/" | "/cleardb") => Ok(Reply::text(405, "Method Not Allowed")),
            _ => Ok(Reply::text(404, "Not Found")),
        };
        result.unwrap_or_else(|e| {
            log::error!("{method} {path} failed: {e:#}");
            Reply::text(500, format!("Internal Server Error\n\n{e:#}"))
        })
    }

    fn index(&mut self) -> Result<Reply> {
        self.pipeline.run_cycle(&mut self.repo, self.fetch_limit)?;
        let emails = self.repo.list_all_ordered()?;
        let page = self
            .templates
            .get_template("index.html")?
            .render(context! { emails => emails })?;
        Ok(Reply::html(page))
    }

    fn clear(&mut self) -> Result<Reply> {
        let removed = self.repo.clear_all()?;
        log::info!("database is cleared ({removed} rows)");
        Ok(Reply::text(200, "Database cleared"))
    }
}

/// Serve requests one at a time until Ctrl-C.
pub fn serve<S, C, R>(app: &mut App<S, C, R>, addr: &str) -> Result<()>
where
    S: MailSource,
    C: Classifier,
    R: EmailRepository,
{
    let server = Arc::new(Server::http(addr).map_err(|e| anyhow!("binding {addr}: {e}"))?);
    let stopper = server.clone();
    ctrlc::set_handler(move || stopper.unblock())?;

    log::info!("Listening on http://{addr}");
    for request in server.incoming_requests() {
        let reply = app.handle(request.method(), request.url());
        log::info!("{} {} -> {}", request.method(), request.url(), reply.status);
        if let Err(e) = request.respond(reply.into_response()?) {
            log::warn!("could not write response: {e}");
        }
    }
    log::info!("Server stopped");
    Ok(())
}
