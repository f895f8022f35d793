//! Minimal line-oriented session description model.
//!
//! Only what negotiation needs: media sections with their attributes, and
//! the simulcast reception patch for generated answers.

use std::fmt;

use thiserror::Error;

use crate::proto::{MediaKind, TransceiverDirection};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SdpParseError {
    #[error("malformed SDP line {line}: '{content}'")]
    MalformedLine { line: usize, content: String },

    #[error("malformed media line: '{0}'")]
    MalformedMedia(String),
}

/// Direction of a simulcast/rid declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RidDirection {
    Send,
    Recv,
}

impl RidDirection {
    fn as_str(self) -> &'static str {
        match self {
            RidDirection::Send => "send",
            RidDirection::Recv => "recv",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionDescriptionModel {
    session: Vec<String>,
    media: Vec<MediaSection>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaSection {
    kind: String,
    /// All lines of the section, the `m=` line first.
    lines: Vec<String>,
}

impl SessionDescriptionModel {
    pub fn parse(sdp: &str) -> Result<Self, SdpParseError> {
        let mut session = Vec::new();
        let mut media: Vec<MediaSection> = Vec::new();

        for (n, line) in sdp.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let bytes = line.as_bytes();
            if bytes.len() < 2 || bytes[1] != b'=' {
                return Err(SdpParseError::MalformedLine {
                    line: n + 1,
                    content: line.to_string(),
                });
            }

            if let Some(desc) = line.strip_prefix("m=") {
                let kind = desc
                    .split_whitespace()
                    .next()
                    .ok_or_else(|| SdpParseError::MalformedMedia(line.into()))?;
                media.push(MediaSection {
                    kind: kind.to_string(),
                    lines: vec![line.to_string()],
                });
            } else if let Some(section) = media.last_mut() {
                section.lines.push(line.to_string());
            } else {
                session.push(line.to_string());
            }
        }

        Ok(Self { session, media })
    }

    pub fn session_lines(&self) -> &[String] {
        &self.session
    }

    pub fn media(&self) -> &[MediaSection] {
        &self.media
    }

    pub fn media_mut(&mut self) -> &mut [MediaSection] {
        &mut self.media
    }

    /// Declares reception of the offered simulcast layers on every media
    /// section of this answer whose counterpart in `offer` sends simulcast.
    ///
    /// Returns `true` if any line was added.
    pub fn declare_simulcast_recv(
        &mut self,
        offer: &SessionDescriptionModel,
    ) -> bool {
        let mut patched = false;
        for (answer, offered) in self.media.iter_mut().zip(offer.media()) {
            if offered.has_simulcast(RidDirection::Send) {
                patched |=
                    answer.declare_simulcast_recv(&offered.rids(RidDirection::Send));
            }
        }
        patched
    }
}

impl fmt::Display for SessionDescriptionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines = self
            .session
            .iter()
            .chain(self.media.iter().flat_map(|m| m.lines.iter()));
        for line in lines {
            write!(f, "{}\r\n", line)?;
        }
        Ok(())
    }
}

impl MediaSection {
    pub fn new(kind: MediaKind, mid: &str) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            lines: vec![
                format!("m={} 9 UDP/TLS/RTP/SAVPF 96", kind),
                format!("a=mid:{}", mid),
            ],
        }
    }

    pub fn kind(&self) -> Option<MediaKind> {
        MediaKind::from_sdp(&self.kind)
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Values of all `a=<name>:<value>` attributes.
    pub fn attributes<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.lines.iter().filter_map(move |l| {
            l.strip_prefix("a=")?
                .strip_prefix(name)?
                .strip_prefix(':')
        })
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.lines
            .iter()
            .any(|l| l.strip_prefix("a=") == Some(name))
    }

    pub fn mid(&self) -> Option<&str> {
        self.attributes("mid").next()
    }

    pub fn direction(&self) -> TransceiverDirection {
        self.lines
            .iter()
            .filter_map(|l| l.strip_prefix("a="))
            .find_map(TransceiverDirection::from_sdp)
            .unwrap_or(TransceiverDirection::SendRecv)
    }

    pub fn set_direction(&mut self, direction: TransceiverDirection) {
        let existing = self.lines.iter().position(|l| {
            l.strip_prefix("a=")
                .and_then(TransceiverDirection::from_sdp)
                .is_some()
        });
        let line = format!("a={}", direction);
        match existing {
            Some(i) => self.lines[i] = line,
            None => self.lines.push(line),
        }
    }

    pub fn push_attribute(&mut self, attribute: impl Into<String>) {
        self.lines.push(format!("a={}", attribute.into()));
    }

    /// Layer ids declared for the given direction, in declaration order.
    pub fn rids(&self, direction: RidDirection) -> Vec<&str> {
        self.attributes("rid")
            .filter_map(|value| {
                let mut parts = value.split_whitespace();
                let rid = parts.next()?;
                (parts.next()? == direction.as_str()).then(|| rid)
            })
            .collect()
    }

    pub fn has_simulcast(&self, direction: RidDirection) -> bool {
        self.attributes("simulcast").any(|value| {
            value.split_whitespace().next() == Some(direction.as_str())
        })
    }

    /// Declares sending of the given simulcast layers.
    pub fn declare_simulcast_send<S: AsRef<str>>(&mut self, rids: &[S]) {
        self.declare_simulcast(rids, RidDirection::Send);
    }

    /// Declares reception of the given simulcast layers, skipping lines that
    /// are already present.
    pub fn declare_simulcast_recv<S: AsRef<str>>(&mut self, rids: &[S]) -> bool {
        self.declare_simulcast(rids, RidDirection::Recv)
    }

    fn declare_simulcast<S: AsRef<str>>(
        &mut self,
        rids: &[S],
        direction: RidDirection,
    ) -> bool {
        if rids.is_empty() {
            return false;
        }
        let mut patched = false;
        for rid in rids {
            let rid = rid.as_ref();
            if !self.rids(direction).contains(&rid) {
                self.push_attribute(format!("rid:{} {}", rid, direction.as_str()));
                patched = true;
            }
        }
        if !self.has_simulcast(direction) {
            let layers: Vec<&str> = rids.iter().map(AsRef::as_ref).collect();
            self.push_attribute(format!(
                "simulcast:{} {}",
                direction.as_str(),
                layers.join(";")
            ));
            patched = true;
        }
        patched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER: &str = "v=0\r\n\
        o=- 1 2 IN IP4 127.0.0.1\r\n\
        s=-\r\n\
        t=0 0\r\n\
        m=audio 9 UDP/TLS/RTP/SAVPF 96\r\n\
        a=mid:0\r\n\
        a=sendonly\r\n\
        m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
        a=mid:1\r\n\
        a=sendonly\r\n\
        a=rid:r0 send\r\n\
        a=rid:r1 send\r\n\
        a=rid:r2 send\r\n\
        a=simulcast:send r0;r1;r2\r\n";

    const ANSWER: &str = "v=0\r\n\
        o=- 7 2 IN IP4 127.0.0.1\r\n\
        s=-\r\n\
        t=0 0\r\n\
        m=audio 9 UDP/TLS/RTP/SAVPF 96\r\n\
        a=mid:0\r\n\
        a=recvonly\r\n\
        m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
        a=mid:1\r\n\
        a=recvonly\r\n";

    #[test]
    fn parses_sections_and_attributes() {
        let offer = SessionDescriptionModel::parse(OFFER).unwrap();

        assert_eq!(offer.session_lines().len(), 4);
        assert_eq!(offer.media().len(), 2);

        let video = &offer.media()[1];
        assert_eq!(video.kind(), Some(MediaKind::Video));
        assert_eq!(video.mid(), Some("1"));
        assert_eq!(video.direction(), TransceiverDirection::SendOnly);
        assert_eq!(video.rids(RidDirection::Send), vec!["r0", "r1", "r2"]);
        assert!(video.has_simulcast(RidDirection::Send));
        assert!(!offer.media()[0].has_simulcast(RidDirection::Send));
    }

    #[test]
    fn renders_back_to_identical_text() {
        let offer = SessionDescriptionModel::parse(OFFER).unwrap();
        assert_eq!(offer.to_string(), OFFER);
    }

    #[test]
    fn rejects_garbage_lines() {
        let err = SessionDescriptionModel::parse("v=0\r\nhello\r\n").unwrap_err();
        assert_eq!(
            err,
            SdpParseError::MalformedLine {
                line: 2,
                content: "hello".into()
            }
        );
    }

    #[test]
    fn simulcast_recv_declared_once_in_stable_order() {
        let offer = SessionDescriptionModel::parse(OFFER).unwrap();
        let mut answer = SessionDescriptionModel::parse(ANSWER).unwrap();

        assert!(answer.declare_simulcast_recv(&offer));
        // A repeated round must not duplicate declarations.
        assert!(!answer.declare_simulcast_recv(&offer));

        let reparsed =
            SessionDescriptionModel::parse(&answer.to_string()).unwrap();
        let video = &reparsed.media()[1];
        let rid_lines: Vec<&String> = video
            .lines()
            .iter()
            .filter(|l| l.starts_with("a=rid:"))
            .collect();
        assert_eq!(
            rid_lines,
            vec!["a=rid:r0 recv", "a=rid:r1 recv", "a=rid:r2 recv"]
        );
        assert_eq!(
            video.attributes("simulcast").collect::<Vec<_>>(),
            vec!["recv r0;r1;r2"]
        );

        // Audio section is not touched.
        assert_eq!(reparsed.media()[0].lines().len(), 3);
    }

    #[test]
    fn keeps_natively_declared_simulcast() {
        let offer = SessionDescriptionModel::parse(OFFER).unwrap();
        let native = format!(
            "{}a=rid:r0 recv\r\na=rid:r1 recv\r\na=rid:r2 recv\r\n\
             a=simulcast:recv r0;r1;r2\r\n",
            ANSWER
        );
        let mut answer = SessionDescriptionModel::parse(&native).unwrap();

        assert!(!answer.declare_simulcast_recv(&offer));
        assert_eq!(answer.to_string(), native);
    }

    #[test]
    fn declares_layers_the_offer_sends() {
        let offer = SessionDescriptionModel::parse(
            &OFFER.replace("r0", "hi").replace("r1", "mid").replace("r2", "lo"),
        )
        .unwrap();
        let mut answer = SessionDescriptionModel::parse(ANSWER).unwrap();

        assert!(answer.declare_simulcast_recv(&offer));

        let video = &answer.media()[1];
        assert_eq!(video.rids(RidDirection::Recv), vec!["hi", "mid", "lo"]);
        assert_eq!(
            video.attributes("simulcast").collect::<Vec<_>>(),
            vec!["recv hi;mid;lo"]
        );
        assert!(!answer.to_string().contains("r0"));
    }

    #[test]
    fn replaces_direction_in_place() {
        let mut section = MediaSection::new(MediaKind::Audio, "0");
        section.set_direction(TransceiverDirection::SendRecv);
        section.set_direction(TransceiverDirection::Inactive);

        assert_eq!(section.direction(), TransceiverDirection::Inactive);
        assert_eq!(section.lines().len(), 3);
    }
}
