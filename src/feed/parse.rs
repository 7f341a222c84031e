// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Context-sensitive walk over an RSS document.
//!
//! The walker does not build a tree. Each element is classified by its own tag
//! name together with the names of its parent and grandparent, so a document
//! must follow the usual `rss > channel > item` nesting for item fields to
//! attach. Feeds that nest items differently produce fewer (or no) episodes
//! rather than an error.

use std::borrow::Cow;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use quick_xml::Reader;
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, BytesText, Event};
use sha2::{Digest, Sha256};

use crate::error::FeedError;

/// Channel-level metadata plus the episodes of one parsed feed
#[derive(Debug, Clone, PartialEq)]
pub struct FeedDocument {
    pub title: String,
    /// Channel description, or the `itunes:summary` when the description is empty
    pub description: String,
    pub link: Option<String>,
    pub image_url: Option<String>,
    pub last_updated: DateTime<Utc>,
    /// Episodes in document order
    pub episodes: Vec<EpisodeRecord>,
}

/// A single `<item>` of a feed
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeRecord {
    pub identifier: String,
    pub title: String,
    pub description: String,
    pub link: Option<String>,
    pub media_url: String,
    pub media_type: String,
    pub duration_text: String,
    pub published_at: DateTime<Utc>,
}

/// Parse RSS feed XML bytes into a [`FeedDocument`].
///
/// Only structural problems (the input is not well-formed XML) are errors.
/// Missing or unparsable field values fall back to defaults.
pub fn parse_feed(xml: &[u8]) -> Result<FeedDocument, FeedError> {
    let mut reader = Reader::from_reader(xml);
    let decoder = reader.decoder();

    let mut stack: Vec<String> = Vec::new();
    let mut builder = FeedBuilder::default();
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = tag_name(&e);
                builder.open(&ElementContext::new(&name, &stack), &e, decoder);
                stack.push(name);
                saw_root = true;
            }
            Ok(Event::Empty(e)) => {
                let name = tag_name(&e);
                builder.open(&ElementContext::new(&name, &stack), &e, decoder);
                builder.close(stack.len());
                saw_root = true;
            }
            Ok(Event::End(_)) => {
                stack.pop();
                builder.close(stack.len());
            }
            Ok(Event::Text(t)) => builder.text(&unescape_text(&t)),
            Ok(Event::CData(c)) => builder.text(&String::from_utf8_lossy(&c)),
            Ok(Event::Eof) => break,
            Err(e) => return Err(FeedError::Malformed(e.to_string())),
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(FeedError::Malformed(format!("unclosed element <{}>", open)));
    }
    if !saw_root {
        return Err(FeedError::Malformed("document has no root element".to_string()));
    }

    Ok(builder.finish())
}

fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

/// Feeds routinely contain HTML entities such as `&nbsp;` that XML does not
/// define; keep the raw text for those instead of failing.
fn unescape_text(t: &BytesText<'_>) -> String {
    t.unescape()
        .map(Cow::into_owned)
        .unwrap_or_else(|_| String::from_utf8_lossy(t).into_owned())
}

fn attribute(e: &BytesStart<'_>, key: &[u8], decoder: Decoder) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .and_then(|attr| attr.decode_and_unescape_value(decoder).ok())
        .map(Cow::into_owned)
}

/// Position of an element: its name, its parent's and grandparent's names,
/// and how many ancestors it has
struct ElementContext<'a> {
    name: &'a str,
    parent: &'a str,
    grandparent: &'a str,
    depth: usize,
}

impl<'a> ElementContext<'a> {
    fn new(name: &'a str, ancestors: &'a [String]) -> Self {
        let mut up = ancestors.iter().rev().map(String::as_str);
        let parent = up.next().unwrap_or("");
        let grandparent = up.next().unwrap_or("");
        Self {
            name,
            parent,
            grandparent,
            depth: ancestors.len(),
        }
    }
}

/// Which record the walker is currently filling
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    #[default]
    Channel,
    Item(usize),
}

#[derive(Debug, Clone, Copy)]
enum ChannelField {
    Title,
    Description,
    Summary,
    PubDate,
    Link,
    ImageUrl,
}

#[derive(Debug, Clone, Copy)]
enum ItemField {
    Title,
    Description,
    Duration,
    Guid,
    PubDate,
    Link,
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Channel(ChannelField),
    Item(usize, ItemField),
}

/// Text being collected for the element at `depth`
struct Capture {
    target: Target,
    depth: usize,
    text: String,
}

/// Raw values of one item, converted to an [`EpisodeRecord`] once the walk ends
#[derive(Debug, Default)]
struct PendingEpisode {
    guid: Option<String>,
    title: String,
    description: String,
    link: Option<String>,
    media_url: String,
    media_type: String,
    duration_text: String,
    pub_date: Option<String>,
}

#[derive(Default)]
struct FeedBuilder {
    title: String,
    description: String,
    summary: String,
    link: Option<String>,
    itunes_image: Option<String>,
    image_url: Option<String>,
    pub_date: Option<String>,
    episodes: Vec<PendingEpisode>,
    cursor: Cursor,
    capture: Option<Capture>,
}

impl FeedBuilder {
    fn open(&mut self, element: &ElementContext<'_>, start: &BytesStart<'_>, decoder: Decoder) {
        let target = match (element.grandparent, element.parent, element.name) {
            ("channel", "item", name) => {
                let Cursor::Item(index) = self.cursor else {
                    return;
                };
                match name {
                    "enclosure" => {
                        let episode = &mut self.episodes[index];
                        episode.media_url = attribute(start, b"url", decoder).unwrap_or_default();
                        episode.media_type =
                            attribute(start, b"type", decoder).unwrap_or_default();
                        return;
                    }
                    "title" => Target::Item(index, ItemField::Title),
                    "description" => Target::Item(index, ItemField::Description),
                    "itunes:duration" => Target::Item(index, ItemField::Duration),
                    "guid" => Target::Item(index, ItemField::Guid),
                    "pubDate" => Target::Item(index, ItemField::PubDate),
                    "link" => Target::Item(index, ItemField::Link),
                    _ => return,
                }
            }
            ("channel", "image", "url") => Target::Channel(ChannelField::ImageUrl),
            (_, "channel", name) => match name {
                "item" => {
                    self.episodes.push(PendingEpisode::default());
                    self.cursor = Cursor::Item(self.episodes.len() - 1);
                    return;
                }
                "itunes:image" => {
                    self.itunes_image = attribute(start, b"href", decoder);
                    return;
                }
                "title" => Target::Channel(ChannelField::Title),
                "description" => Target::Channel(ChannelField::Description),
                "itunes:summary" => Target::Channel(ChannelField::Summary),
                "pubDate" => Target::Channel(ChannelField::PubDate),
                "link" => Target::Channel(ChannelField::Link),
                _ => return,
            },
            (_, _, "channel") => {
                self.cursor = Cursor::Channel;
                return;
            }
            _ => return,
        };

        self.capture = Some(Capture {
            target,
            depth: element.depth,
            text: String::new(),
        });
    }

    fn text(&mut self, text: &str) {
        if let Some(capture) = self.capture.as_mut() {
            capture.text.push_str(text);
        }
    }

    /// Called when the element with `depth` ancestors is closed
    fn close(&mut self, depth: usize) {
        if !self.capture.as_ref().is_some_and(|c| c.depth == depth) {
            return;
        }
        let Some(capture) = self.capture.take() else {
            return;
        };
        let value = capture.text.trim().to_string();

        match capture.target {
            Target::Channel(field) => match field {
                ChannelField::Title => self.title = value,
                ChannelField::Description => self.description = value,
                ChannelField::Summary => self.summary = value,
                ChannelField::PubDate => self.pub_date = Some(value),
                ChannelField::Link => self.link = Some(value).filter(|s| !s.is_empty()),
                ChannelField::ImageUrl => self.image_url = Some(value).filter(|s| !s.is_empty()),
            },
            Target::Item(index, field) => {
                let episode = &mut self.episodes[index];
                match field {
                    ItemField::Title => episode.title = value,
                    ItemField::Description => episode.description = value,
                    ItemField::Duration => episode.duration_text = value,
                    ItemField::Guid => episode.guid = Some(value),
                    ItemField::PubDate => episode.pub_date = Some(value),
                    ItemField::Link => episode.link = Some(value).filter(|s| !s.is_empty()),
                }
            }
        }
    }

    fn finish(self) -> FeedDocument {
        let description = if self.description.is_empty() {
            self.summary
        } else {
            self.description
        };

        FeedDocument {
            title: self.title,
            description,
            link: self.link,
            image_url: self.itunes_image.or(self.image_url),
            last_updated: pub_date_or_now(self.pub_date.as_deref()),
            episodes: self.episodes.into_iter().map(PendingEpisode::finish).collect(),
        }
    }
}

impl PendingEpisode {
    fn finish(self) -> EpisodeRecord {
        let identifier = self.identifier();
        EpisodeRecord {
            identifier,
            published_at: pub_date_or_now(self.pub_date.as_deref()),
            title: self.title,
            description: self.description,
            link: self.link,
            media_url: self.media_url,
            media_type: self.media_type,
            duration_text: self.duration_text,
        }
    }

    /// The feed's guid, else the enclosure URL, else a hash of title and raw
    /// publication date. Episodes without a guid must not all share one empty
    /// identifier.
    fn identifier(&self) -> String {
        if let Some(guid) = self.guid.as_deref().filter(|g| !g.is_empty()) {
            return guid.to_string();
        }
        if !self.media_url.is_empty() {
            return self.media_url.clone();
        }

        let mut hasher = Sha256::new();
        hasher.update(self.title.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.pub_date.as_deref().unwrap_or_default().as_bytes());
        format!("sha256:{:x}", hasher.finalize())
    }
}

/// Parse a feed date, substituting the current time when it is missing or
/// cannot be understood
fn pub_date_or_now(date_str: Option<&str>) -> DateTime<Utc> {
    date_str
        .and_then(parse_pub_date)
        .unwrap_or_else(Utc::now)
}

/// Parse an RFC 2822 date (`Mon, 01 Jan 2024 12:00:00 GMT`) or one of the
/// near-misses commonly found in feeds
fn parse_pub_date(date_str: &str) -> Option<DateTime<Utc>> {
    let date_str = date_str.trim();

    DateTime::parse_from_rfc2822(date_str)
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(date_str).ok())
        .or_else(|| parse_relaxed_date(date_str))
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| parse_zoneless_date(date_str))
}

fn parse_relaxed_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    [
        "%a, %d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S %z",
        "%a, %d %b %Y %H:%M %z",
        "%Y-%m-%d %H:%M:%S %z",
    ]
    .into_iter()
    .find_map(|format| DateTime::parse_from_str(date_str, format).ok())
}

/// Dates without any zone are taken as UTC
fn parse_zoneless_date(date_str: &str) -> Option<DateTime<Utc>> {
    ["%a, %d %b %Y %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .into_iter()
        .find_map(|format| NaiveDateTime::parse_from_str(date_str, format).ok())
        .map(|naive| naive.and_utc())
}
