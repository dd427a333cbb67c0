use lazy_static::lazy_static;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::stub::StubTransport;
use lettre::{Message, SmtpTransport, Transport};
use regex::Regex;

use crate::config::Config;
use crate::error::{Result, SurveyError};

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?)+$")
            .unwrap();
}

/// Syntactic email check, mirrored by the client before any request is made
pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && EMAIL_REGEX.is_match(email)
}

enum MailTransport {
    Smtp(SmtpTransport),
    Stub(StubTransport),
}

pub struct Mailer {
    transport: MailTransport,
    from: Mailbox,
}

impl Mailer {
    /// Build an SMTP mailer from configuration
    ///
    /// Returns `Ok(None)` when no SMTP host is configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        let Some(host) = config.smtp_host.as_deref() else {
            return Ok(None);
        };

        let tls_parameters = TlsParameters::new(host.to_string()).map_err(mail_error)?;
        let mut builder = SmtpTransport::relay(host)
            .map_err(mail_error)?
            .port(config.smtp_port)
            .tls(Tls::Wrapper(tls_parameters));

        if let (Some(user), Some(password)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Some(Mailer {
            transport: MailTransport::Smtp(builder.build()),
            from: parse_mailbox(&config.mail_from)?,
        }))
    }

    /// A mailer that never touches the network; `succeed` picks the outcome
    pub fn stub(succeed: bool) -> Self {
        let transport = if succeed {
            StubTransport::new_ok()
        } else {
            StubTransport::new_error()
        };

        Mailer {
            transport: MailTransport::Stub(transport),
            from: "Survey Sheets <surveys@example.com>"
                .parse()
                .expect("static sender address"),
        }
    }

    /// Email a survey link to `to_email`
    pub fn send_survey_link(&self, to_email: &str, title: &str, link: &str) -> Result<()> {
        let to = parse_mailbox(to_email)?;
        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(format!("You're invited to fill in \"{}\"", title))
            .body(format!(
                "You have been invited to answer the survey \"{}\".\n\nOpen it here: {}\n",
                title, link
            ))
            .map_err(mail_error)?;

        match &self.transport {
            MailTransport::Smtp(smtp) => smtp.send(&email).map(|_| ()).map_err(mail_error),
            MailTransport::Stub(stub) => stub.send(&email).map_err(mail_error),
        }
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|_| SurveyError::InvalidEmail(address.to_string()))
}

fn mail_error(e: impl std::fmt::Display) -> SurveyError {
    SurveyError::Mail(e.to_string())
}
