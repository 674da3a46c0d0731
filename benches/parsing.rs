use criterion::{criterion_group, criterion_main, Criterion};
use std::fmt::Write;
use std::path::Path;

use takeout_xref::index::{MboxXrefBuilder, XmlDocumentIndex};

const MESSAGES: usize = 2_000;

fn from_id(i: usize) -> String {
    format!("{i}-aaaaaaaa-bbbb-cccc-dddd-{i:012x}.mbox")
}

fn synthetic_mbox() -> String {
    let mut out = String::new();
    for i in 0..MESSAGES {
        let _ = write!(
            out,
            "From {}@xxx Mon Jan 01 00:00:00 +0000 2018\n\
             Message-ID: <msg{i}@example.com>\n\
             Subject: message {i}\n\
             \n\
             {}\n\n",
            from_id(i),
            "body line\n".repeat(20)
        );
    }
    out
}

fn synthetic_export() -> String {
    let mut out = String::from("<Root><Batch><Documents>");
    for i in 0..MESSAGES {
        let _ = write!(
            out,
            r##"<Document DocID="{i}"><Tags>
                 <Tag TagName="#Subject" TagDataType="Text" TagValue="message {i}"/>
                 <Tag TagName="#DateSent" TagDataType="DateTime" TagValue="2018-01-01T00:00:00.000Z"/>
                 <Tag TagName="Labels" TagDataType="Text" TagValue="Inbox,Label{}"/>
               </Tags>
               <Files><File><ExternalFile FileName="{}"/></File></Files></Document>"##,
            i % 10,
            from_id(i)
        );
    }
    out.push_str("</Documents></Batch></Root>");
    out
}

fn bench_xref_build(c: &mut Criterion) {
    let mbox = synthetic_mbox();
    c.bench_function("build_xref_2000_messages", |b| {
        b.iter(|| {
            let mut xref = MboxXrefBuilder::new();
            xref.build("bench", mbox.as_bytes()).unwrap();
            xref.size()
        })
    });
}

fn bench_xml_index(c: &mut Criterion) {
    let xml = synthetic_export();
    c.bench_function("index_xml_2000_documents", |b| {
        b.iter(|| {
            let mut index = XmlDocumentIndex::new();
            index
                .parse_reader(xml.as_bytes(), Path::new("bench.xml"))
                .unwrap();
            index.document_count()
        })
    });
}

criterion_group!(benches, bench_xref_build, bench_xml_index);
criterion_main!(benches);
