//! HTTP authentication shared by the CalDAV and EWS clients.
//!
//! Basic (RFC 7617) is sent pre-emptively. When the server answers `401`
//! with a Digest challenge (RFC 7616, MD5 only) or an NTLM offer, the client
//! switches to that scheme for the rest of the session.

use std::collections::HashMap;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ntlmclient::{Flags, Message, NegotiateMessage};
use rand::Rng;

use crate::error::{ProviderError, ProviderResult};

/// Workstation name announced in NTLM messages.
const NTLM_WORKSTATION: &str = "UNICAL";

/// Username/password pair resolved from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// `Authorization` value for HTTP Basic.
    pub fn basic_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(raw))
    }

    /// Splits `DOMAIN\user`. Other forms, `user@domain` included, go out
    /// with an empty domain.
    fn ntlm(&self) -> ntlmclient::Credentials {
        let (domain, username) = match self.username.split_once('\\') {
            Some((domain, user)) => (domain, user),
            None => ("", self.username.as_str()),
        };
        ntlmclient::Credentials {
            username: username.to_owned(),
            password: self.password.clone(),
            domain: domain.to_owned(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A Digest challenge taken from `WWW-Authenticate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    /// `true` when the server offered `qop=auth`.
    pub qop_auth: bool,
    nonce_count: u32,
}

impl DigestChallenge {
    /// Parses a single challenge, e.g. `Digest realm="x", nonce="y", qop="auth"`.
    ///
    /// Returns `None` for other schemes and for non-MD5 algorithms.
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, rest) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }

        let params = parse_params(rest);
        let md5 = params
            .get("algorithm")
            .is_none_or(|a| a.eq_ignore_ascii_case("md5"));
        if !md5 {
            return None;
        }

        Some(Self {
            realm: params.get("realm")?.clone(),
            nonce: params.get("nonce")?.clone(),
            opaque: params.get("opaque").cloned(),
            qop_auth: params
                .get("qop")
                .is_some_and(|q| q.split(',').any(|v| v.trim() == "auth")),
            nonce_count: 0,
        })
    }

    /// Builds the `Authorization` value for one request.
    pub fn respond(&mut self, method: &str, uri: &str, credentials: &Credentials) -> String {
        self.nonce_count += 1;
        let nc = format!("{:08x}", self.nonce_count);
        let cnonce = client_nonce();

        let ha1 = md5_hex(&format!(
            "{}:{}:{}",
            credentials.username, self.realm, credentials.password
        ));
        let ha2 = md5_hex(&format!("{method}:{uri}"));
        let response = if self.qop_auth {
            md5_hex(&format!("{ha1}:{}:{nc}:{cnonce}:auth:{ha2}", self.nonce))
        } else {
            md5_hex(&format!("{ha1}:{}:{ha2}", self.nonce))
        };

        let mut header = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{uri}\", response=\"{response}\", algorithm=MD5",
            credentials.username, self.realm, self.nonce
        );
        if self.qop_auth {
            header.push_str(&format!(", qop=auth, nc={nc}, cnonce=\"{cnonce}\""));
        }
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(", opaque=\"{opaque}\""));
        }
        header
    }
}

/// The scheme a client currently authenticates with.
#[derive(Debug, Clone, Default)]
pub enum AuthScheme {
    #[default]
    Basic,
    Digest(DigestChallenge),
    /// NTLMv2; each request runs its own negotiate/authenticate exchange.
    Ntlm,
}

impl AuthScheme {
    /// Picks a scheme from all `WWW-Authenticate` values of a 401 response.
    ///
    /// Digest wins over NTLM, which wins over Basic. Returns `None` when
    /// none of them is offered (e.g. Negotiate/Kerberos only).
    pub fn from_challenges<'a>(challenges: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let (mut basic, mut ntlm) = (false, false);
        for challenge in challenges {
            if let Some(digest) = DigestChallenge::parse(challenge) {
                return Some(Self::Digest(digest));
            }
            for part in challenge.split(',') {
                let scheme = part.trim().split(' ').next().unwrap_or_default();
                basic |= scheme.eq_ignore_ascii_case("basic");
                ntlm |= scheme.eq_ignore_ascii_case("ntlm");
            }
        }
        if ntlm {
            Some(Self::Ntlm)
        } else {
            basic.then_some(Self::Basic)
        }
    }

    /// `Authorization` value for a request to `uri` (path component).
    ///
    /// NTLM starts with the negotiate message; the caller finishes the
    /// exchange with [`ntlm_authenticate_header`].
    pub fn header(
        &mut self,
        method: &str,
        uri: &str,
        credentials: &Credentials,
    ) -> ProviderResult<String> {
        match self {
            Self::Basic => Ok(credentials.basic_header()),
            Self::Digest(challenge) => Ok(challenge.respond(method, uri, credentials)),
            Self::Ntlm => ntlm_negotiate_header(),
        }
    }
}

/// `Authorization` value carrying an NTLM negotiate (type 1) message.
pub fn ntlm_negotiate_header() -> ProviderResult<String> {
    let flags = Flags::NEGOTIATE_UNICODE
        | Flags::REQUEST_TARGET
        | Flags::NEGOTIATE_NTLM
        | Flags::NEGOTIATE_WORKSTATION_SUPPLIED;
    let message = Message::Negotiate(NegotiateMessage {
        flags,
        supplied_domain: String::new(),
        supplied_workstation: NTLM_WORKSTATION.to_owned(),
        os_version: Default::default(),
    });
    let bytes = message.to_bytes().map_err(|e| {
        ProviderError::internal(format!("failed to encode NTLM negotiate message: {e:?}"))
    })?;
    Ok(format!("NTLM {}", STANDARD.encode(bytes)))
}

/// The decoded server challenge from `WWW-Authenticate: NTLM <token>`.
pub fn ntlm_challenge<'a>(challenges: impl IntoIterator<Item = &'a str>) -> Option<Vec<u8>> {
    challenges.into_iter().find_map(|challenge| {
        let (scheme, token) = challenge.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("ntlm") {
            return None;
        }
        STANDARD.decode(token.trim()).ok()
    })
}

/// `Authorization` value answering a challenge (type 2) with an NTLMv2
/// authenticate (type 3) message.
pub fn ntlm_authenticate_header(
    challenge: &[u8],
    credentials: &Credentials,
) -> ProviderResult<String> {
    let challenge = match Message::try_from(challenge) {
        Ok(Message::Challenge(challenge)) => challenge,
        Ok(_) => {
            return Err(ProviderError::authentication(
                "NTLM server answered with an unexpected message",
            ));
        }
        Err(e) => {
            return Err(ProviderError::authentication(format!(
                "invalid NTLM challenge: {e:?}"
            )));
        }
    };

    let target_info: Vec<u8> = challenge
        .target_information
        .iter()
        .flat_map(|entry| entry.to_bytes())
        .collect();
    let ntlm_credentials = credentials.ntlm();
    let response = ntlmclient::respond_challenge_ntlm_v2(
        challenge.challenge,
        &target_info,
        ntlmclient::get_ntlm_time(),
        &ntlm_credentials,
    );
    let message = response.to_message(
        &ntlm_credentials,
        NTLM_WORKSTATION,
        Flags::NEGOTIATE_UNICODE | Flags::NEGOTIATE_NTLM,
    );
    let bytes = message.to_bytes().map_err(|e| {
        ProviderError::internal(format!("failed to encode NTLM authenticate message: {e:?}"))
    })?;
    Ok(format!("NTLM {}", STANDARD.encode(bytes)))
}

fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = input.trim();

    while !rest.is_empty() {
        rest = rest.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
        let Some((key, after_eq)) = rest.split_once('=') else {
            break;
        };
        let key = key.trim().to_ascii_lowercase();

        let (value, remaining) = if let Some(quoted) = after_eq.strip_prefix('"') {
            let mut value = String::new();
            let mut chars = quoted.char_indices();
            let mut end = quoted.len();
            while let Some((i, c)) = chars.next() {
                match c {
                    '\\' => {
                        if let Some((_, escaped)) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => {
                        end = i + 1;
                        break;
                    }
                    other => value.push(other),
                }
            }
            (value, &quoted[end..])
        } else {
            let end = after_eq.find(',').unwrap_or(after_eq.len());
            (after_eq[..end].trim().to_string(), &after_eq[end..])
        };

        params.insert(key, value);
        rest = remaining;
    }

    params
}

fn client_nonce() -> String {
    let bytes: [u8; 8] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}
