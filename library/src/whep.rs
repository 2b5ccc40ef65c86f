/*!
WebRTC-HTTP egress (WHEP) negotiation, independent of any HTTP client.

[`WhepNegotiator`] builds the requests a viewer has to issue and interprets
the responses; the caller is responsible for actually sending them:

1. `OPTIONS` the endpoint and read the ICE servers from its `Link` headers,
2. `POST` the local offer and receive the answer together with the session URL,
3. `PATCH` local candidates to the session URL as SDP fragments,
4. `DELETE` the session URL when done.
*/

use anyhow::{anyhow, bail, Context};
use camview_protocol::{IceCandidate, IceServer, IceServerList, SessionDescription};
use http::header::{CONTENT_TYPE, IF_MATCH, LINK, LOCATION};
use http::{Method, Request, Response, StatusCode};
use log::{debug, info};
use url::Url;

use crate::config::Endpoint;
use crate::constants::{SDP_CONTENT_TYPE, TRICKLE_ICE_CONTENT_TYPE};

/// The parts of a local offer needed to build trickle ICE fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferData {
    pub ice_ufrag: String,
    pub ice_pwd: String,
    /// Value of every `m=` line, in order.
    pub medias: Vec<String>,
}

impl OfferData {
    /// # Errors
    /// Fails when the offer has no ICE credentials.
    pub fn parse(sdp: &str) -> crate::Result<Self> {
        let mut ice_ufrag = None;
        let mut ice_pwd = None;
        let mut medias = Vec::new();

        for line in sdp.lines() {
            if let Some(media) = line.strip_prefix("m=") {
                medias.push(media.to_owned());
            } else if let Some(ufrag) = line.strip_prefix("a=ice-ufrag:") {
                ice_ufrag.get_or_insert_with(|| ufrag.to_owned());
            } else if let Some(pwd) = line.strip_prefix("a=ice-pwd:") {
                ice_pwd.get_or_insert_with(|| pwd.to_owned());
            }
        }

        Ok(Self {
            ice_ufrag: ice_ufrag.context("offer has no ice-ufrag")?,
            ice_pwd: ice_pwd.context("offer has no ice-pwd")?,
            medias,
        })
    }

    /// Build an `application/trickle-ice-sdpfrag` body carrying `candidates`.
    ///
    /// Candidates are grouped by their m-line index; media sections without
    /// candidates are left out.
    pub fn sdp_fragment(&self, candidates: &[IceCandidate]) -> String {
        let mut fragment = format!(
            "a=ice-ufrag:{}\r\na=ice-pwd:{}\r\n",
            self.ice_ufrag, self.ice_pwd
        );

        for (index, media) in self.medias.iter().enumerate() {
            let mut section = candidates
                .iter()
                .filter(|candidate| usize::from(candidate.sdp_m_line_index.unwrap_or(0)) == index)
                .peekable();
            if section.peek().is_none() {
                continue;
            }
            fragment.push_str(&format!("m={media}\r\na=mid:{index}\r\n"));
            for candidate in section {
                fragment.push_str(&format!("a={}\r\n", candidate.candidate));
            }
        }
        fragment
    }
}

/// Parse the `Link` headers of an `OPTIONS` response into ICE servers.
///
/// Entries look like
/// `<turn:host:3478>; rel="ice-server"; username="u"; credential="c"`;
/// links with any other relation are skipped.
pub fn ice_servers_from_links<'a>(values: impl IntoIterator<Item = &'a str>) -> IceServerList {
    let mut servers = Vec::new();
    for value in values {
        for link in split_links(value) {
            if let Some(server) = parse_link(link) {
                servers.push(server);
            }
        }
    }
    IceServerList(servers)
}

fn split_links(value: &str) -> Vec<&str> {
    let mut links = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (index, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                links.push(value[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    links.push(value[start..].trim());
    links.retain(|link| !link.is_empty());
    links
}

fn parse_link(link: &str) -> Option<IceServer> {
    let rest = link.strip_prefix('<')?;
    let end = rest.find('>')?;
    let url = &rest[..end];

    let mut rel = None;
    let mut username = None;
    let mut credential = None;
    for param in rest[end + 1..].split(';') {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').to_owned();
        match key.trim().to_ascii_lowercase().as_str() {
            "rel" => rel = Some(value),
            "username" => username = Some(value),
            "credential" => credential = Some(value),
            _ => {}
        }
    }

    if !rel.map_or(false, |rel| rel.eq_ignore_ascii_case("ice-server")) {
        return None;
    }
    let server = IceServer::new(url);
    Some(match (username, credential) {
        (Some(username), Some(credential)) => server.with_credentials(username, credential),
        _ => server,
    })
}

/// One WHEP playback session.
#[derive(Debug)]
pub struct WhepNegotiator {
    endpoint: Endpoint,
    offer: Option<OfferData>,
    session_url: Option<Url>,
    queued_candidates: Vec<IceCandidate>,
    torn_down: bool,
}

impl WhepNegotiator {
    /// # Errors
    /// Fails unless `endpoint` is an `http` or `https` URL.
    pub fn new(endpoint: Endpoint) -> crate::Result<Self> {
        if endpoint.is_websocket() {
            bail!("WHEP endpoint must be http or https, got {}", endpoint);
        }
        Ok(Self {
            endpoint,
            offer: None,
            session_url: None,
            queued_candidates: Vec::new(),
            torn_down: false,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Forget the previous session so the endpoint can be negotiated anew.
    /// Take the [`Self::teardown_request`] first if the old session should be
    /// deleted on the server.
    pub fn reset(&mut self) {
        self.offer = None;
        self.session_url = None;
        self.queued_candidates.clear();
        self.torn_down = false;
    }

    /// Known once the answer was accepted.
    pub fn session_url(&self) -> Option<&Url> {
        self.session_url.as_ref()
    }

    /// # Errors
    /// Fails when the request cannot be built.
    pub fn ice_servers_request(&self) -> crate::Result<Request<String>> {
        Ok(Request::builder()
            .method(Method::OPTIONS)
            .uri(self.endpoint.as_str())
            .body(String::new())?)
    }

    pub fn ice_servers_from_response(response: &Response<String>) -> IceServerList {
        let servers = ice_servers_from_links(
            response
                .headers()
                .get_all(LINK)
                .iter()
                .filter_map(|value| value.to_str().ok()),
        );
        debug!("endpoint advertised {} ICE server(s)", servers.len());
        servers
    }

    /// # Errors
    /// Fails when the offer lacks ICE credentials or the request cannot be built.
    pub fn offer_request(&mut self, offer: &SessionDescription) -> crate::Result<Request<String>> {
        self.offer = Some(OfferData::parse(&offer.sdp)?);
        Ok(Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.as_str())
            .header(CONTENT_TYPE, SDP_CONTENT_TYPE)
            .body(offer.sdp.clone())?)
    }

    /// Accept the response to the offer and return the answer.
    ///
    /// # Errors
    /// Fails on anything but `201 Created` with a usable `Location` header.
    pub fn on_answer(&mut self, response: Response<String>) -> crate::Result<SessionDescription> {
        match response.status() {
            StatusCode::CREATED => {}
            StatusCode::NOT_FOUND => bail!("stream not found"),
            status => bail!("bad status code {}", status),
        }
        let location = response
            .headers()
            .get(LOCATION)
            .context("answer has no Location header")?
            .to_str()
            .context("Location header is not valid text")?;
        let session_url = self
            .endpoint
            .url()
            .join(location)
            .with_context(|| format!("invalid session location {location}"))?;

        info!("WHEP session created at {}", session_url);
        self.session_url = Some(session_url);
        Ok(SessionDescription::answer(response.into_body()))
    }

    /// Queue or send a local candidate.
    ///
    /// Returns a request only when the session URL is already known;
    /// end-of-candidates markers never produce one.
    ///
    /// # Errors
    /// Fails when no offer was sent yet or the request cannot be built.
    pub fn candidate_request(
        &mut self,
        candidate: IceCandidate,
    ) -> crate::Result<Option<Request<String>>> {
        if candidate.is_end_of_candidates() || self.torn_down {
            return Ok(None);
        }
        self.queued_candidates.push(candidate);
        if self.session_url.is_none() {
            debug!("session not created yet, queueing local candidate");
            return Ok(None);
        }
        self.flush_candidates()
    }

    /// Send every candidate queued before the answer arrived.
    ///
    /// # Errors
    /// Fails when no offer was sent yet or the request cannot be built.
    pub fn flush_candidates(&mut self) -> crate::Result<Option<Request<String>>> {
        let Some(session_url) = self.session_url.as_ref() else {
            return Ok(None);
        };
        if self.queued_candidates.is_empty() || self.torn_down {
            return Ok(None);
        }
        let offer = self
            .offer
            .as_ref()
            .ok_or_else(|| anyhow!("no offer was sent"))?;
        let fragment = offer.sdp_fragment(&self.queued_candidates);
        let request = Request::builder()
            .method(Method::PATCH)
            .uri(session_url.as_str())
            .header(CONTENT_TYPE, TRICKLE_ICE_CONTENT_TYPE)
            .header(IF_MATCH, "*")
            .body(fragment)?;
        self.queued_candidates.clear();
        Ok(Some(request))
    }

    /// # Errors
    /// Fails when the server rejected the candidates.
    pub fn on_candidates_response(response: &Response<String>) -> crate::Result<()> {
        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => bail!("stream not found"),
            status => bail!("bad status code {}", status),
        }
    }

    /// `DELETE` the session. Yields a request at most once, and only when a
    /// session was created.
    pub fn teardown_request(&mut self) -> Option<Request<String>> {
        if self.torn_down {
            return None;
        }
        self.torn_down = true;
        self.queued_candidates.clear();
        let session_url = self.session_url.take()?;
        Request::builder()
            .method(Method::DELETE)
            .uri(session_url.as_str())
            .body(String::new())
            .ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const OFFER: &str = "v=0\r\n\
        o=- 1 2 IN IP4 127.0.0.1\r\n\
        m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
        a=ice-ufrag:abcd\r\n\
        a=ice-pwd:secret\r\n\
        a=mid:0\r\n\
        m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
        a=mid:1\r\n";

    fn negotiator() -> WhepNegotiator {
        WhepNegotiator::new(Endpoint::parse("http://camera.local:8889/cam1/whep").unwrap())
            .unwrap()
    }

    fn created(location: &str) -> Response<String> {
        Response::builder()
            .status(StatusCode::CREATED)
            .header(LOCATION, location)
            .body("v=0 answer".to_owned())
            .unwrap()
    }

    fn candidate(line: &str, index: u16) -> IceCandidate {
        IceCandidate::new(line, Some(index.to_string()), Some(index))
    }

    #[test]
    fn websocket_endpoint_is_rejected() {
        assert!(WhepNegotiator::new(Endpoint::parse("ws://camera.local/ws").unwrap()).is_err());
    }

    #[test]
    fn offer_data_is_read_from_sdp() {
        let data = OfferData::parse(OFFER).unwrap();
        assert_eq!(data.ice_ufrag, "abcd");
        assert_eq!(data.ice_pwd, "secret");
        assert_eq!(
            data.medias,
            ["video 9 UDP/TLS/RTP/SAVPF 96", "audio 9 UDP/TLS/RTP/SAVPF 111"]
        );
        assert!(OfferData::parse("v=0\r\n").is_err());
    }

    #[test]
    fn fragment_groups_candidates_by_media() {
        let data = OfferData::parse(OFFER).unwrap();
        let fragment = data.sdp_fragment(&[candidate(
            "candidate:1 1 udp 1 10.0.0.1 5000 typ host",
            1,
        )]);
        assert_eq!(
            fragment,
            "a=ice-ufrag:abcd\r\na=ice-pwd:secret\r\n\
             m=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=mid:1\r\n\
             a=candidate:1 1 udp 1 10.0.0.1 5000 typ host\r\n"
        );
    }

    #[test]
    fn link_headers_become_ice_servers() {
        let servers = ice_servers_from_links([
            r#"<stun:stun.l.google.com:19302>; rel="ice-server""#,
            r#"<turn:turn.local:3478?transport=udp>; rel="ice-server"; username="u,1"; credential="p"; credential-type="password", </other>; rel="next""#,
        ]);
        assert_eq!(
            servers,
            IceServerList(vec![
                IceServer::new("stun:stun.l.google.com:19302"),
                IceServer::new("turn:turn.local:3478?transport=udp").with_credentials("u,1", "p"),
            ])
        );
    }

    #[test]
    fn options_and_offer_requests() {
        let mut negotiator = negotiator();
        let options = negotiator.ice_servers_request().unwrap();
        assert_eq!(options.method(), Method::OPTIONS);

        let post = negotiator
            .offer_request(&SessionDescription::offer(OFFER))
            .unwrap();
        assert_eq!(post.method(), Method::POST);
        assert_eq!(post.headers()[CONTENT_TYPE], SDP_CONTENT_TYPE);
        assert_eq!(post.body(), OFFER);
    }

    #[test]
    fn answer_requires_created_and_location() {
        let mut negotiator = negotiator();
        negotiator
            .offer_request(&SessionDescription::offer(OFFER))
            .unwrap();

        let not_found = Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(String::new())
            .unwrap();
        assert!(negotiator.on_answer(not_found).is_err());

        let no_location = Response::builder()
            .status(StatusCode::CREATED)
            .body(String::new())
            .unwrap();
        assert!(negotiator.on_answer(no_location).is_err());

        let answer = negotiator.on_answer(created("/cam1/whep/session/42")).unwrap();
        assert_eq!(answer, SessionDescription::answer("v=0 answer"));
        assert_eq!(
            negotiator.session_url().map(Url::as_str),
            Some("http://camera.local:8889/cam1/whep/session/42")
        );
    }

    #[test]
    fn relative_location_resolves_against_the_endpoint() {
        let mut negotiator = negotiator();
        negotiator
            .offer_request(&SessionDescription::offer(OFFER))
            .unwrap();
        negotiator.on_answer(created("session/1")).unwrap();
        assert_eq!(
            negotiator.session_url().map(Url::as_str),
            Some("http://camera.local:8889/cam1/session/1")
        );
    }

    #[test]
    fn candidates_wait_for_the_session() {
        let mut negotiator = negotiator();
        negotiator
            .offer_request(&SessionDescription::offer(OFFER))
            .unwrap();

        assert!(negotiator
            .candidate_request(candidate("candidate:early", 0))
            .unwrap()
            .is_none());
        assert!(negotiator
            .candidate_request(IceCandidate::default())
            .unwrap()
            .is_none());

        negotiator.on_answer(created("session/1")).unwrap();
        let patch = negotiator.flush_candidates().unwrap().unwrap();
        assert_eq!(patch.method(), Method::PATCH);
        assert_eq!(patch.headers()[IF_MATCH], "*");
        assert_eq!(patch.headers()[CONTENT_TYPE], TRICKLE_ICE_CONTENT_TYPE);
        assert!(patch.body().contains("a=candidate:early"));
        assert!(negotiator.flush_candidates().unwrap().is_none());

        let late = negotiator
            .candidate_request(candidate("candidate:late", 0))
            .unwrap()
            .unwrap();
        assert!(late.body().contains("a=candidate:late"));
        assert!(!late.body().contains("early"));
    }

    #[test]
    fn teardown_happens_once() {
        let mut negotiator = negotiator();
        negotiator
            .offer_request(&SessionDescription::offer(OFFER))
            .unwrap();
        negotiator.on_answer(created("/cam1/whep/session/1")).unwrap();

        let delete = negotiator.teardown_request().unwrap();
        assert_eq!(delete.method(), Method::DELETE);
        assert_eq!(
            delete.uri().to_string(),
            "http://camera.local:8889/cam1/whep/session/1"
        );
        assert!(negotiator.teardown_request().is_none());
        assert!(negotiator
            .candidate_request(candidate("candidate:1", 0))
            .unwrap()
            .is_none());
    }

    #[test]
    fn teardown_without_session_sends_nothing() {
        assert!(negotiator().teardown_request().is_none());
    }

    #[test]
    fn reset_allows_a_new_session() {
        let mut negotiator = negotiator();
        negotiator
            .offer_request(&SessionDescription::offer(OFFER))
            .unwrap();
        negotiator.on_answer(created("session/1")).unwrap();
        negotiator.teardown_request().unwrap();

        negotiator.reset();
        assert!(negotiator.session_url().is_none());
        negotiator
            .offer_request(&SessionDescription::offer(OFFER))
            .unwrap();
        negotiator.on_answer(created("session/2")).unwrap();
        assert!(negotiator.teardown_request().is_some());
    }
}
