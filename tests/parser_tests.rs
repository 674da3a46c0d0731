//! Integration tests for the MBOX scanner, xref builder, and XML document index.

use std::path::{Path, PathBuf};

use takeout_xref::error::XrefError;
use takeout_xref::index::{MboxXrefBuilder, XmlDocumentIndex};
use takeout_xref::model::document::MetadataValue;
use takeout_xref::parser::mbox::MboxParser;

const ID0: &str = "0-aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee.mbox";
const ID1: &str = "1-aaaaaaaa-bbbb-cccc-dddd-ffffffffffff.mbox";
const ID2: &str = "2-aaaaaaaa-bbbb-cccc-dddd-000000000000.mbox";

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn takeout_mbox() -> String {
    format!(
        "From {ID0}@xxx Mon Jan 01 00:00:00 +0000 2018\n\
         Message-ID: <msg1>\n\
         Subject: first\n\
         \n\
         Hello\n\
         >From the archive, not a separator\n\
         \n\
         From {ID1}@xxx Tue Jan 02 00:00:00 +0000 2018\n\
         Message-ID:\n <msg2>\n\
         Subject: second\n\
         \n\
         Body two\n\
         \n\
         From {ID2}@xxx Wed Jan 03 00:00:00 +0000 2018\n\
         Message-ID: <msg3>\n\
         \n\
         Body three\n"
    )
}

fn export_xml(documents: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Root DataInterchangeType="Update">
  <Batch name="export">
    <Documents>{documents}</Documents>
  </Batch>
</Root>"#
    )
}

// ─── MBOX scanning ──────────────────────────────────────────────────

#[test]
fn test_scan_counts_boundaries() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "takeout.mbox", &takeout_mbox());

    let parser = MboxParser::new(&path).unwrap();
    let mut count = 0u64;
    parser
        .parse_headers_only(
            &mut |_offset, _len, _headers| {
                count += 1;
                true
            },
            None,
        )
        .unwrap();
    assert_eq!(count, 3, "escaped >From must not start a message");
}

#[test]
fn test_missing_mbox_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = MboxParser::new(dir.path().join("nope.mbox")).err().unwrap();
    assert!(matches!(err, XrefError::FileNotFound(_)));
}

// ─── Xref building ──────────────────────────────────────────────────

#[test]
fn test_xref_size_matches_boundary_count() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "takeout.mbox", &takeout_mbox());

    let mut xref = MboxXrefBuilder::new();
    let added = xref.build_from_path(&path, None).unwrap();
    assert_eq!(added, 3);
    assert_eq!(xref.size(), 3);

    assert_eq!(xref.from_id_for("<msg1>"), Some(ID0));
    assert_eq!(xref.from_id_for("msg2"), Some(ID1), "folded Message-ID header");
    assert_eq!(xref.from_id_for(" <msg3> "), Some(ID2));
    assert_eq!(xref.from_id_for("<msg4>"), None);
}

#[test]
fn test_xref_accumulates_across_containers() {
    let dir = tempfile::tempdir().unwrap();
    let first = write(dir.path(), "a.mbox", &takeout_mbox());
    let second = write(
        dir.path(),
        "b.mbox",
        "From 7-aaaaaaaa-bbbb-cccc-dddd-111111111111.mbox@xxx Mon Jan 01 00:00:00 +0000 2018\n\
         Message-ID: <other>\n\n body\n",
    );

    let mut xref = MboxXrefBuilder::new().with_read_buffer_size(8 * 1024);
    xref.build_from_path(&first, None).unwrap();
    xref.build_from_path(&second, None).unwrap();
    assert_eq!(xref.size(), 4);
    assert_eq!(
        xref.from_id_for("<other>"),
        Some("7-aaaaaaaa-bbbb-cccc-dddd-111111111111.mbox")
    );
    assert_eq!(xref.from_id_for("<msg1>"), Some(ID0));
}

#[test]
fn test_xref_skips_messages_without_message_id() {
    let mbox = format!(
        "From {ID0}@xxx Mon Jan 01 00:00:00 +0000 2018\nSubject: no id\n\nbody\n\n\
         From {ID1}@xxx Mon Jan 01 00:00:00 +0000 2018\nMessage-ID: <kept>\n\nbody\n"
    );
    let mut xref = MboxXrefBuilder::new();
    let added = xref.build("inline", mbox.as_bytes()).unwrap();
    assert_eq!(added, 1);
    assert_eq!(xref.from_id_for("<kept>"), Some(ID1));
}

#[test]
fn test_xref_empty_container() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "empty.mbox", "");
    let mut xref = MboxXrefBuilder::new();
    assert_eq!(xref.build_from_path(&path, None).unwrap(), 0);
    assert!(xref.is_empty());
}

#[test]
fn test_xref_save_csv() {
    let dir = tempfile::tempdir().unwrap();
    let mut xref = MboxXrefBuilder::new();
    xref.build("inline", takeout_mbox().as_bytes()).unwrap();

    let out = dir.path().join("xref.csv");
    xref.save(&out).unwrap();
    let csv = std::fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "From,Message-ID");
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[1], format!("{ID0},msg1"));
}

// ─── XML document index ─────────────────────────────────────────────

#[test]
fn test_labels_union_across_files() {
    let dir = tempfile::tempdir().unwrap();
    let first = write(
        dir.path(),
        "one.xml",
        &export_xml(&format!(
            r##"<Document DocID="1">
                 <Tags>
                   <Tag TagName="#Subject" TagDataType="Text" TagValue="first"/>
                   <Tag TagName="Labels" TagDataType="Text" TagValue="Inbox,Important"/>
                 </Tags>
                 <Files><File><ExternalFile FileName="{ID0}"/></File></Files>
               </Document>"##
        )),
    );
    let second = write(
        dir.path(),
        "two.xml",
        &export_xml(&format!(
            r#"<Document DocID="1">
                 <Labels><Label>Work</Label><Label>Inbox</Label></Labels>
                 <Files><File><ExternalFile FileName="{ID0}"/></File></Files>
               </Document>
               <Document DocID="2">
                 <Files><File><ExternalFile FileName="{ID1}"/></File></Files>
               </Document>"#
        )),
    );

    let mut index = XmlDocumentIndex::new();
    index.parse(&first).unwrap();
    let report = index.parse(&second).unwrap();
    assert_eq!(report.documents, 2);
    assert_eq!(report.merged, 1);

    assert_eq!(index.nodes_parsed(), 3);
    assert_eq!(index.document_count(), 2);

    let doc = index.get(ID0).unwrap();
    let labels: Vec<&str> = doc.labels.iter().map(String::as_str).collect();
    assert_eq!(labels, vec!["Important", "Inbox", "Work"]);
    assert_eq!(
        doc.tags[0].value,
        MetadataValue::Text("first".to_string())
    );
    assert!(index.get(ID1).unwrap().labels.is_empty());
}

#[test]
fn test_malformed_file_leaves_index_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let good = write(
        dir.path(),
        "good.xml",
        &export_xml(&format!(
            r#"<Document><Files><File><ExternalFile FileName="{ID0}"/></File></Files></Document>"#
        )),
    );
    let bad = write(
        dir.path(),
        "bad.xml",
        &export_xml(&format!(
            r#"<Document><Files><File><ExternalFile FileName="{ID1}"/></File></Files></Document>
               <Document><Tags><Tag TagValue="no name"/></Tags></Document>"#
        )),
    );

    let mut index = XmlDocumentIndex::new();
    index.parse(&good).unwrap();
    assert!(index.parse(&bad).is_err());
    assert_eq!(index.document_count(), 1);
    assert!(index.get(ID1).is_none());
    assert!(index.get(ID0).is_some());
}

#[test]
fn test_invalid_date_drops_only_that_tag() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "dates.xml",
        &export_xml(&format!(
            r##"<Document>
                 <Tags>
                   <Tag TagName="#DateSent" TagDataType="DateTime" TagValue="yesterday"/>
                   <Tag TagName="#DateReceived" TagDataType="DateTime" TagValue="2018-01-01T10:00:00.000+0100"/>
                 </Tags>
                 <Files><File><ExternalFile FileName="{ID0}"/></File></Files>
               </Document>"##
        )),
    );

    let mut index = XmlDocumentIndex::new();
    let report = index.parse(&path).unwrap();
    assert_eq!(report.tag_errors.len(), 1);
    assert!(matches!(
        report.tag_errors[0],
        XrefError::InvalidDateTime { .. }
    ));

    let doc = index.get(ID0).unwrap();
    assert_eq!(doc.tags.len(), 1);
    assert_eq!(doc.tags[0].name, "#DateReceived");
    assert!(index.distinct_tag_names().contains("#DateReceived"));
}

#[test]
fn test_missing_xml_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut index = XmlDocumentIndex::new();
    let err = index.parse(&dir.path().join("missing.xml")).unwrap_err();
    assert!(matches!(err, XrefError::FileNotFound(_)));
}
