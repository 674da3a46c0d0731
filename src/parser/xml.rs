//! Streaming reader for the export's metadata XML.
//!
//! Only the structure needed for cross-referencing is understood: `Document`
//! nodes, their `Tag` nodes, `Label` nodes, and the `FileName` attribute of
//! their `ExternalFile` node. Everything else is skipped. Elements are
//! matched by local name at any depth.

use std::collections::BTreeSet;
use std::io::BufRead;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::error::{Result, XrefError};
use crate::model::document::{split_list, Document, Tag, TagDataType};

/// Tag whose value lists the mailbox labels of a document.
pub const LABELS_TAG_NAME: &str = "Labels";

/// Outcome of parsing one export file.
#[derive(Debug, Default)]
pub struct ParsedExport {
    /// Documents in file order. A file name may appear more than once.
    pub documents: Vec<Document>,
    /// Tags dropped because their value could not be converted.
    pub tag_errors: Vec<XrefError>,
}

#[derive(Default)]
struct DocumentBuilder {
    ordinal: usize,
    external_file_name: Option<String>,
    labels: BTreeSet<String>,
    tags: Vec<Tag>,
}

struct PendingTag {
    name: String,
    data_type: String,
    value: Option<String>,
    text: String,
}

/// Parse one export file. Any structural error fails the whole file.
pub fn parse_export<R: BufRead>(source: R, path: &Path) -> Result<ParsedExport> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut out = ParsedExport::default();
    let mut current: Option<DocumentBuilder> = None;
    let mut pending_tag: Option<PendingTag> = None;
    let mut label_text: Option<String> = None;
    let mut ordinal = 0usize;

    let xml_err = |reader: &Reader<R>, reason: String| XrefError::Xml {
        path: path.to_path_buf(),
        position: reader.buffer_position() as u64,
        reason,
    };

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| xml_err(&reader, e.to_string()))?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.local_name().as_ref() {
                    b"Document" => {
                        if current.is_some() {
                            return Err(xml_err(&reader, "nested Document element".into()));
                        }
                        ordinal += 1;
                        let doc = DocumentBuilder {
                            ordinal,
                            ..Default::default()
                        };
                        if is_empty {
                            out.documents.push(finish_document(doc, path)?);
                        } else {
                            current = Some(doc);
                        }
                    }
                    b"ExternalFile" => {
                        if let Some(doc) = current.as_mut() {
                            if doc.external_file_name.is_none() {
                                doc.external_file_name = attribute(e, b"FileName")
                                    .map_err(|r| xml_err(&reader, r))?
                                    .filter(|v| !v.trim().is_empty());
                            }
                        }
                    }
                    b"Tag" => match current.as_mut() {
                        Some(doc) => {
                            let name = attribute(e, b"TagName")
                                .map_err(|r| xml_err(&reader, r))?
                                .filter(|v| !v.trim().is_empty())
                                .ok_or_else(|| XrefError::MissingNode {
                                    path: path.to_path_buf(),
                                    node: "Tag/@TagName",
                                    document: doc.ordinal,
                                })?;
                            let tag = PendingTag {
                                name,
                                data_type: attribute(e, b"TagDataType")
                                    .map_err(|r| xml_err(&reader, r))?
                                    .unwrap_or_default(),
                                value: attribute(e, b"TagValue")
                                    .map_err(|r| xml_err(&reader, r))?,
                                text: String::new(),
                            };
                            if is_empty {
                                finish_tag(doc, tag, &mut out.tag_errors);
                            } else {
                                pending_tag = Some(tag);
                            }
                        }
                        None => debug!("Ignoring Tag outside of a Document"),
                    },
                    b"Label" if current.is_some() && !is_empty => {
                        label_text = Some(String::new());
                    }
                    _ => {}
                }
            }
            Event::Text(ref e) => {
                let text = e.unescape().map_err(|err| xml_err(&reader, err.to_string()))?;
                if let Some(label) = label_text.as_mut() {
                    label.push_str(&text);
                } else if let Some(tag) = pending_tag.as_mut() {
                    tag.text.push_str(&text);
                }
            }
            Event::CData(ref e) => {
                let text = String::from_utf8_lossy(e).into_owned();
                if let Some(label) = label_text.as_mut() {
                    label.push_str(&text);
                } else if let Some(tag) = pending_tag.as_mut() {
                    tag.text.push_str(&text);
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"Document" => {
                    if let Some(doc) = current.take() {
                        out.documents.push(finish_document(doc, path)?);
                    }
                }
                b"Tag" => {
                    if let (Some(tag), Some(doc)) = (pending_tag.take(), current.as_mut()) {
                        finish_tag(doc, tag, &mut out.tag_errors);
                    }
                }
                b"Label" => {
                    if let (Some(label), Some(doc)) = (label_text.take(), current.as_mut()) {
                        let label = label.trim();
                        if !label.is_empty() {
                            doc.labels.insert(label.to_string());
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if current.is_some() {
        return Err(xml_err(&reader, "unexpected end of file inside Document".into()));
    }

    Ok(out)
}

/// Read and unescape an attribute by local name.
fn attribute(element: &BytesStart<'_>, name: &[u8]) -> std::result::Result<Option<String>, String> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        if attr.key.local_name().as_ref() == name {
            let value = attr.unescape_value().map_err(|e| e.to_string())?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn finish_tag(doc: &mut DocumentBuilder, tag: PendingTag, errors: &mut Vec<XrefError>) {
    let raw = tag.value.unwrap_or(tag.text);
    let is_labels = tag.name.eq_ignore_ascii_case(LABELS_TAG_NAME);
    let data_type = if is_labels {
        TagDataType::List
    } else {
        TagDataType::from_export(&tag.data_type)
    };

    if is_labels {
        doc.labels.extend(split_list(&raw));
    }

    match Tag::parse(&tag.name, data_type, &raw) {
        Ok(parsed) => doc.tags.push(parsed),
        Err(e) => {
            warn!(document = doc.ordinal, error = %e, "Dropping tag");
            errors.push(e);
        }
    }
}

fn finish_document(doc: DocumentBuilder, path: &Path) -> Result<Document> {
    let external_file_name = doc.external_file_name.ok_or(XrefError::MissingNode {
        path: path.to_path_buf(),
        node: "ExternalFile/@FileName",
        document: doc.ordinal,
    })?;
    Ok(Document {
        external_file_name,
        labels: doc.labels,
        tags: doc.tags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::document::MetadataValue;

    fn parse(xml: &str) -> Result<ParsedExport> {
        parse_export(xml.as_bytes(), Path::new("test.xml"))
    }

    const SAMPLE: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<Root DataInterchangeType="Update">
  <Batch name="export">
    <Documents>
      <Document DocID="1">
        <Tags>
          <Tag TagName="#Subject" TagDataType="Text" TagValue="Fish &amp; chips"/>
          <Tag TagName="#DateSent" TagDataType="DateTime" TagValue="2017-01-02T03:04:05.000Z"/>
          <Tag TagName="Labels" TagDataType="Text" TagValue="^INBOX,Work"/>
          <Tag TagName="#To" TagDataType="List">a@x, b@x</Tag>
        </Tags>
        <Files>
          <File FileType="Native">
            <ExternalFile FilePath="mail" FileName="0-aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee.mbox"/>
          </File>
        </Files>
      </Document>
      <Document DocID="2">
        <Labels><Label>Archived</Label></Labels>
        <Files><File><ExternalFile FileName="1-aaaaaaaa-bbbb-cccc-dddd-ffffffffffff.mbox"/></File></Files>
      </Document>
    </Documents>
  </Batch>
</Root>"##;

    #[test]
    fn test_parse_sample_export() {
        let parsed = parse(SAMPLE).unwrap();
        assert!(parsed.tag_errors.is_empty());
        assert_eq!(parsed.documents.len(), 2);

        let first = &parsed.documents[0];
        assert_eq!(
            first.external_file_name,
            "0-aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee.mbox"
        );
        assert_eq!(
            first.labels.iter().cloned().collect::<Vec<_>>(),
            vec!["Work".to_string(), "^INBOX".to_string()]
        );
        assert_eq!(first.tags.len(), 4);
        assert_eq!(first.tags[0].value, MetadataValue::Text("Fish & chips".into()));
        assert!(matches!(first.tags[1].value, MetadataValue::DateTime(_)));
        assert_eq!(first.tags[2].data_type, TagDataType::List);
        assert_eq!(
            first.tags[3].value,
            MetadataValue::List(vec!["a@x".into(), "b@x".into()])
        );

        let second = &parsed.documents[1];
        assert!(second.labels.contains("Archived"));
        assert!(second.tags.is_empty());
    }

    #[test]
    fn test_bad_date_drops_only_that_tag() {
        let xml = r##"<Root><Document>
            <Tag TagName="#DateSent" TagDataType="DateTime" TagValue="yesterday"/>
            <Tag TagName="#Subject" TagDataType="Text" TagValue="ok"/>
            <ExternalFile FileName="f.mbox"/>
        </Document></Root>"##;
        let parsed = parse(xml).unwrap();
        assert_eq!(parsed.tag_errors.len(), 1);
        assert_eq!(parsed.documents[0].tags.len(), 1);
        assert_eq!(parsed.documents[0].tags[0].name, "#Subject");
    }

    #[test]
    fn test_document_without_external_file_fails_file() {
        let xml = r#"<Root><Document><Tag TagName="a" TagValue="b"/></Document></Root>"#;
        let err = parse(xml).unwrap_err();
        assert!(matches!(
            err,
            XrefError::MissingNode {
                node: "ExternalFile/@FileName",
                document: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_tag_without_name_fails_file() {
        let xml = r#"<Root><Document><Tag TagValue="b"/><ExternalFile FileName="f"/></Document></Root>"#;
        assert!(matches!(
            parse(xml).unwrap_err(),
            XrefError::MissingNode { node: "Tag/@TagName", .. }
        ));
    }

    #[test]
    fn test_malformed_xml_fails_file() {
        let xml = r#"<Root><Document><ExternalFile FileName="f"/></Documen></Root>"#;
        assert!(matches!(parse(xml).unwrap_err(), XrefError::Xml { .. }));
    }

    #[test]
    fn test_truncated_document_fails_file() {
        let xml = r#"<Root><Document><ExternalFile FileName="f"/>"#;
        assert!(parse(xml).is_err());
    }
}
