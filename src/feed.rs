//! Reading and writing the persisted RSS 2.0 document.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::{info, warn};

use crate::config::ChannelConfig;
use crate::date;
use crate::episode::FeedItem;
use crate::error::{Error, Result};
use crate::text::{sanitize_xml_text, strip_html};

const ITUNES_NS: &str = "http://www.itunes.com/dtds/podcast-1.0.dtd";
const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// Load the items of an existing feed. A missing file is
/// [`Error::FeedNotFound`].
pub fn load(path: &Path, now: DateTime<Utc>) -> Result<Vec<FeedItem>> {
    if !path.exists() {
        return Err(Error::FeedNotFound {
            path: path.to_path_buf(),
        });
    }
    let xml = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let items = parse_items(&xml, now)?;
    info!(path = %path.display(), count = items.len(), "loaded existing feed");
    Ok(items)
}

/// Write the whole feed, replacing `path` only once the document is complete.
pub fn save(
    path: &Path,
    channel: &ChannelConfig,
    items: &[FeedItem],
    built: DateTime<Utc>,
) -> Result<()> {
    let bytes = render(channel, items, built)?;
    let tmp = tmp_path(path);
    fs::write(&tmp, &bytes).map_err(|e| Error::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| Error::io(path, e))?;
    info!(path = %path.display(), count = items.len(), "wrote feed");
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[derive(Default)]
struct PartialItem {
    title: String,
    link: String,
    description: String,
    guid: String,
    pub_date: String,
    enclosure: Option<String>,
}

impl PartialItem {
    fn finish(self, now: DateTime<Utc>) -> Option<FeedItem> {
        let audio_url = self
            .enclosure
            .filter(|u| !u.is_empty())
            .or_else(|| Some(self.guid.clone()).filter(|g| !g.is_empty()));
        let Some(audio_url) = audio_url else {
            warn!(title = %self.title, "skipping stored item without enclosure or guid");
            return None;
        };
        let published = date::parse(&self.pub_date).unwrap_or_else(|| {
            warn!(%audio_url, pub_date = %self.pub_date, "stored item has unparseable pubDate");
            now
        });
        Some(FeedItem {
            title: self.title,
            link: if self.link.is_empty() {
                audio_url.clone()
            } else {
                self.link
            },
            description: self.description,
            guid: audio_url.clone(),
            audio_url,
            published,
        })
    }
}

/// Parse the `<item>` elements of an RSS document, in document order.
pub fn parse_items(xml: &str, now: DateTime<Utc>) -> Result<Vec<FeedItem>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<PartialItem> = None;
    let mut current_tag = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "item" {
                    current = Some(PartialItem::default());
                } else if name == "enclosure" {
                    if let Some(item) = current.as_mut() {
                        item.enclosure = enclosure_url(&e);
                    }
                }
                current_tag = name;
            }
            Event::Empty(e) => {
                if e.name().as_ref() == b"enclosure" {
                    if let Some(item) = current.as_mut() {
                        item.enclosure = enclosure_url(&e);
                    }
                }
            }
            Event::End(e) => {
                if e.name().as_ref() == b"item" {
                    if let Some(item) = current.take().and_then(|p| p.finish(now)) {
                        items.push(item);
                    }
                }
                current_tag.clear();
            }
            Event::Text(e) => {
                if let Some(item) = current.as_mut() {
                    let text = e.unescape()?;
                    push_field(item, &current_tag, &text);
                }
            }
            Event::CData(e) => {
                if let Some(item) = current.as_mut() {
                    let text = String::from_utf8_lossy(&e).into_owned();
                    push_field(item, &current_tag, &text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(items)
}

fn push_field(item: &mut PartialItem, tag: &str, text: &str) {
    let field = match tag {
        "title" => &mut item.title,
        "link" => &mut item.link,
        "description" => &mut item.description,
        "guid" => &mut item.guid,
        "pubDate" => &mut item.pub_date,
        _ => return,
    };
    field.push_str(text);
}

fn enclosure_url(e: &BytesStart<'_>) -> Option<String> {
    e.try_get_attribute("url")
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn emit<W: Write>(w: &mut Writer<W>, event: Event<'_>) -> Result<()> {
    w.write_event(event)
        .map_err(|e| Error::Render(e.to_string()))
}

fn write_text_element<W: Write>(w: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    emit(w, Event::Start(BytesStart::new(name)))?;
    let s = sanitize_xml_text(text);
    emit(w, Event::Text(BytesText::new(&s)))?;
    emit(w, Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Serialize the complete feed document.
pub fn render(channel: &ChannelConfig, items: &[FeedItem], built: DateTime<Utc>) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut rss_start = BytesStart::new("rss");
    rss_start.push_attribute(("version", "2.0"));
    rss_start.push_attribute(("xmlns:itunes", ITUNES_NS));
    rss_start.push_attribute(("xmlns:atom", ATOM_NS));
    emit(&mut writer, Event::Start(rss_start))?;
    emit(&mut writer, Event::Start(BytesStart::new("channel")))?;

    write_text_element(&mut writer, "title", &channel.title)?;
    write_text_element(&mut writer, "link", &channel.link)?;
    let mut self_link = BytesStart::new("atom:link");
    self_link.push_attribute(("href", channel.self_link.as_str()));
    self_link.push_attribute(("rel", "self"));
    self_link.push_attribute(("type", "application/rss+xml"));
    emit(&mut writer, Event::Empty(self_link))?;
    write_text_element(&mut writer, "description", &channel.description)?;
    write_text_element(&mut writer, "language", &channel.language)?;
    write_text_element(&mut writer, "lastBuildDate", &date::to_rfc1123(&built))?;

    if let Some(image) = &channel.image_url {
        emit(&mut writer, Event::Start(BytesStart::new("image")))?;
        write_text_element(&mut writer, "url", image)?;
        write_text_element(&mut writer, "title", &channel.title)?;
        write_text_element(&mut writer, "link", &channel.link)?;
        emit(&mut writer, Event::End(BytesEnd::new("image")))?;

        let mut itunes_image = BytesStart::new("itunes:image");
        itunes_image.push_attribute(("href", image.as_str()));
        emit(&mut writer, Event::Empty(itunes_image))?;
    }

    for it in items {
        emit(&mut writer, Event::Start(BytesStart::new("item")))?;
        write_text_element(&mut writer, "title", &it.title)?;
        write_text_element(&mut writer, "link", &it.link)?;

        let mut guid = BytesStart::new("guid");
        guid.push_attribute(("isPermaLink", "false"));
        emit(&mut writer, Event::Start(guid))?;
        emit(&mut writer, Event::Text(BytesText::new(&sanitize_xml_text(&it.guid))))?;
        emit(&mut writer, Event::End(BytesEnd::new("guid")))?;

        write_text_element(&mut writer, "pubDate", &it.pub_date())?;
        write_text_element(&mut writer, "description", &strip_html(&it.description))?;

        let mut enc = BytesStart::new("enclosure");
        enc.push_attribute(("url", it.audio_url.as_str()));
        enc.push_attribute(("length", "0"));
        enc.push_attribute(("type", "audio/mpeg"));
        emit(&mut writer, Event::Empty(enc))?;
        emit(&mut writer, Event::End(BytesEnd::new("item")))?;
    }

    emit(&mut writer, Event::End(BytesEnd::new("channel")))?;
    emit(&mut writer, Event::End(BytesEnd::new("rss")))?;

    let mut out = writer.into_inner();
    out.push(b'\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 0).unwrap()
    }

    fn channel() -> ChannelConfig {
        let mut c = ChannelConfig::for_source(
            "https://www.npr.org/podcasts/510298/ted-radio-hour/archive",
            "https://example.org/ted.xml",
        );
        c.image_url = Some("https://example.org/cover.jpg".to_string());
        c
    }

    fn sample() -> FeedItem {
        FeedItem {
            title: "Rock & Roll <Live> \"Encore\"".to_string(),
            link: "https://www.npr.org/2025/10/14/x/story".to_string(),
            description: "<p>Fans &amp; critics</p>\n\n  weigh in".to_string(),
            audio_url: "https://ondemand.npr.org/a/2025/10/20251014_x.mp3?e=1&t=podcast".to_string(),
            guid: "https://ondemand.npr.org/a/2025/10/20251014_x.mp3?e=1&t=podcast".to_string(),
            published: Utc.with_ymd_and_hms(2025, 10, 14, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn render_includes_channel_and_item_elements() {
        let xml = String::from_utf8(render(&channel(), &[sample()], now()).unwrap()).unwrap();
        assert!(xml.contains(r#"xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd""#));
        assert!(xml.contains(r#"xmlns:atom="http://www.w3.org/2005/Atom""#));
        assert!(xml.contains(r#"<atom:link href="https://example.org/ted.xml" rel="self" type="application/rss+xml"/>"#));
        assert!(xml.contains("<lastBuildDate>Sat, 01 Nov 2025 00:00:00 GMT</lastBuildDate>"));
        assert!(xml.contains(r#"<itunes:image href="https://example.org/cover.jpg"/>"#));
        assert!(xml.contains("<pubDate>Tue, 14 Oct 2025 00:00:00 GMT</pubDate>"));
        assert!(xml.contains(r#"<guid isPermaLink="false">"#));
        assert!(xml.contains(r#"length="0" type="audio/mpeg"/>"#));
        assert!(xml.contains("<description>Fans &amp; critics weigh in</description>"));
    }

    #[test]
    fn render_escapes_text() {
        let xml = String::from_utf8(render(&channel(), &[sample()], now()).unwrap()).unwrap();
        assert!(xml.contains("Rock &amp; Roll &lt;Live&gt; &quot;Encore&quot;"));
        assert!(xml.contains("20251014_x.mp3?e=1&amp;t=podcast"));
    }

    #[test]
    fn rendered_items_parse_back() {
        let xml = String::from_utf8(render(&channel(), &[sample()], now()).unwrap()).unwrap();
        let items = parse_items(&xml, now()).unwrap();
        assert_eq!(items.len(), 1);
        let it = &items[0];
        assert_eq!(it.title, sample().title);
        assert_eq!(it.audio_url, sample().audio_url);
        assert_eq!(it.guid, it.audio_url);
        assert_eq!(it.published, sample().published);
        assert_eq!(it.description, "Fans & critics weigh in");
    }

    #[test]
    fn loader_falls_back_to_guid_and_skips_unidentified_items() {
        let xml = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>c</title>
            <item><title>Guid only</title><guid>https://ondemand.npr.org/a.mp3</guid><pubDate>not a date</pubDate></item>
            <item><title>Nothing</title></item>
            <item><title><![CDATA[Cdata title]]></title><enclosure url="https://ondemand.npr.org/b.mp3" type="audio/mpeg"></enclosure><pubDate>2025-10-01</pubDate></item>
            </channel></rss>"#;
        let items = parse_items(xml, now()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].audio_url, "https://ondemand.npr.org/a.mp3");
        assert_eq!(items[0].link, "https://ondemand.npr.org/a.mp3");
        assert_eq!(items[0].published, now());
        assert_eq!(items[1].title, "Cdata title");
        assert_eq!(items[1].audio_url, "https://ondemand.npr.org/b.mp3");
    }

    #[test]
    fn load_reports_missing_feed() {
        let path = std::env::temp_dir().join("npr2rss-definitely-missing.xml");
        let _ = fs::remove_file(&path);
        assert!(matches!(load(&path, now()), Err(Error::FeedNotFound { .. })));
    }

    #[test]
    fn save_replaces_file_and_leaves_no_temp() {
        let dir = std::env::temp_dir().join(format!("npr2rss-feed-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("feed.xml");
        fs::write(&path, "stale").unwrap();

        save(&path, &channel(), &[sample()], now()).unwrap();

        let loaded = load(&path, now()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(!tmp_path(&path).exists());
        fs::remove_dir_all(&dir).unwrap();
    }

    struct FullSink;

    impl Write for FullSink {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writer_failure_surfaces_as_render_error() {
        let mut writer = Writer::new(FullSink);
        let err = write_text_element(&mut writer, "title", "Episode").unwrap_err();
        assert!(matches!(err, Error::Render(ref m) if m.contains("disk full")), "{err}");
    }
}
