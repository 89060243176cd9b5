use std::fmt::Display;
use std::fs;
use std::path::PathBuf;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::model::{
    DefTable, DefTableItem, JobData, PlainItem, SimpleFolder, SmartFolder, VarData,
};

/// Table item types the export schema knows but this view does not index.
/// They parse as plain items; indexing then rejects the whole export.
const LEGACY_ITEM_TAGS: [&str; 4] = ["TABLE", "SCHED_TABLE", "SMART_TABLE", "SCHED_GROUP"];

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("definitions file '{path}' could not be read: {detail}")]
    SourceUnavailable { path: String, detail: String },
    #[error("definitions file '{path}' failed schema validation: {detail}")]
    SchemaViolation { path: String, detail: String },
    #[error("definitions file '{path}' is malformed: {detail}")]
    Malformed { path: String, detail: String },
}

/// Seam between the cache manager and whatever produces the raw tree.
pub trait DefinitionParser: Send + Sync {
    fn parse(&self) -> Result<DefTable, ParseError>;
}

/// Parses a definition export (`DEFTABLE` → folders → jobs → variables)
/// from disk. Schema checking is structural: the root tag, the allowed
/// top-level children and the mandatory folder attributes.
pub struct XmlDefParser {
    source_path: PathBuf,
}

impl XmlDefParser {
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
        }
    }
}

impl DefinitionParser for XmlDefParser {
    fn parse(&self) -> Result<DefTable, ParseError> {
        let label = self.source_path.display().to_string();
        let content = fs::read_to_string(&self.source_path).map_err(|err| {
            ParseError::SourceUnavailable {
                path: label.clone(),
                detail: err.to_string(),
            }
        })?;
        let table = Doc { label: &label }.parse(&content)?;
        info!("Parsed definition table from '{label}'. {} items found.", table.items.len());
        Ok(table)
    }
}

struct Doc<'s> {
    label: &'s str,
}

impl Doc<'_> {
    fn parse(&self, content: &str) -> Result<DefTable, ParseError> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);

        let mut table = DefTable::default();
        let mut saw_root = false;
        loop {
            match self.next_event(&mut reader)? {
                Event::Start(el) => {
                    let tag = name_of(&el);
                    if !saw_root {
                        if tag != "DEFTABLE" {
                            return Err(self.schema(format!(
                                "root element must be DEFTABLE, found {tag}"
                            )));
                        }
                        saw_root = true;
                    } else {
                        table.items.push(self.parse_item(&mut reader, &el, false)?);
                    }
                }
                Event::Empty(el) => {
                    let tag = name_of(&el);
                    if !saw_root {
                        if tag != "DEFTABLE" {
                            return Err(self.schema(format!(
                                "root element must be DEFTABLE, found {tag}"
                            )));
                        }
                        // an empty export is valid, just has nothing in it
                        saw_root = true;
                    } else {
                        table.items.push(self.parse_item(&mut reader, &el, true)?);
                    }
                }
                Event::End(_) => {}
                Event::Eof => break,
                _ => {}
            }
        }
        if !saw_root {
            return Err(self.schema("document has no DEFTABLE root element"));
        }
        Ok(table)
    }

    fn parse_item(
        &self,
        reader: &mut Reader<&[u8]>,
        el: &BytesStart<'_>,
        is_empty: bool,
    ) -> Result<DefTableItem, ParseError> {
        match name_of(el).as_str() {
            "FOLDER" => {
                let folder = SimpleFolder {
                    data_center: self.required_attr(el, "DATACENTER")?,
                    folder_name: self.required_attr(el, "FOLDER_NAME")?,
                    order_method: self.attr(el, "FOLDER_ORDER_METHOD")?,
                };
                if !is_empty {
                    self.skip_element(reader, el)?;
                }
                debug!(
                    "Parsed simple folder. Server = {}, Folder = {}",
                    folder.data_center, folder.folder_name
                );
                Ok(DefTableItem::Simple(folder))
            }
            "SMART_FOLDER" => Ok(DefTableItem::Smart(
                self.parse_smart_folder(reader, el, is_empty)?,
            )),
            tag if LEGACY_ITEM_TAGS.contains(&tag) => {
                debug!("Processing non-folder item of type '{tag}'...");
                if !is_empty {
                    self.skip_element(reader, el)?;
                }
                Ok(DefTableItem::Plain(PlainItem {
                    tag: tag.to_string(),
                }))
            }
            tag => Err(self.schema(format!("Unsupported DEFTABLE child element {tag}"))),
        }
    }

    fn parse_smart_folder(
        &self,
        reader: &mut Reader<&[u8]>,
        el: &BytesStart<'_>,
        is_empty: bool,
    ) -> Result<SmartFolder, ParseError> {
        let mut folder = SmartFolder {
            data_center: self.required_attr(el, "DATACENTER")?,
            folder_name: self.required_attr(el, "FOLDER_NAME")?,
            order_method: self.attr(el, "FOLDER_ORDER_METHOD")?,
            description: self.attr(el, "DESCRIPTION")?,
            application: self.attr(el, "APPLICATION")?,
            sub_application: self.attr(el, "SUB_APPLICATION")?,
            mem_name: self.attr(el, "MEMNAME")?,
            job_name: self.attr(el, "JOBNAME")?,
            node_id: self.attr(el, "NODEID")?,
            priority: self.attr(el, "PRIORITY")?,
            cyclic: self.attr(el, "CYCLIC")?,
            run_as: self.attr(el, "RUN_AS")?,
            owner: self.attr(el, "OWNER")?,
            author: self.attr(el, "AUTHOR")?,
            created_by: self.attr(el, "CREATED_BY")?,
            variables: Vec::new(),
            jobs: Vec::new(),
        };
        debug!(
            "Parsing smart folder. Server = {}, Folder = {}",
            folder.data_center, folder.folder_name
        );
        if is_empty {
            return Ok(folder);
        }
        loop {
            match self.next_event(reader)? {
                Event::Start(child) => match name_of(&child).as_str() {
                    "JOB" => folder.jobs.push(self.parse_job(reader, &child, false)?),
                    "VARIABLE" => {
                        folder.variables.push(self.parse_variable(&child)?);
                        self.skip_element(reader, &child)?;
                    }
                    tag => {
                        debug!("Unsupported SMART_FOLDER child element {tag}");
                        self.skip_element(reader, &child)?;
                    }
                },
                Event::Empty(child) => match name_of(&child).as_str() {
                    "JOB" => folder.jobs.push(self.parse_job(reader, &child, true)?),
                    "VARIABLE" => folder.variables.push(self.parse_variable(&child)?),
                    tag => debug!("Unsupported SMART_FOLDER child element {tag}"),
                },
                Event::End(_) => break,
                Event::Eof => {
                    return Err(self.malformed("unexpected end of document inside SMART_FOLDER"));
                }
                _ => {}
            }
        }
        Ok(folder)
    }

    fn parse_job(
        &self,
        reader: &mut Reader<&[u8]>,
        el: &BytesStart<'_>,
        is_empty: bool,
    ) -> Result<JobData, ParseError> {
        let mut job = JobData {
            job_name: self.attr(el, "JOBNAME")?,
            mem_name: self.attr(el, "MEMNAME")?,
            node_id: self.attr(el, "NODEID")?,
            application: self.attr(el, "APPLICATION")?,
            sub_application: self.attr(el, "SUB_APPLICATION")?,
            group: self.attr(el, "GROUP")?,
            description: self.attr(el, "DESCRIPTION")?,
            task_type: self.attr(el, "TASKTYPE")?,
            days: self.attr(el, "DAYS")?,
            weekdays: self.attr(el, "WEEKDAYS")?,
            run_as: self.attr(el, "RUN_AS")?,
            owner: self.attr(el, "OWNER")?,
            priority: self.attr(el, "PRIORITY")?,
            critical: self.attr(el, "CRITICAL")?,
            cyclic: self.attr(el, "CYCLIC")?,
            time_from: self.attr(el, "TIMEFROM")?,
            time_to: self.attr(el, "TIMETO")?,
            created_by: self.attr(el, "CREATED_BY")?,
            variables: Vec::new(),
        };
        if is_empty {
            return Ok(job);
        }
        loop {
            match self.next_event(reader)? {
                Event::Start(child) => match name_of(&child).as_str() {
                    "VARIABLE" => {
                        job.variables.push(self.parse_variable(&child)?);
                        self.skip_element(reader, &child)?;
                    }
                    tag => {
                        debug!("Unsupported JOB child element {tag}");
                        self.skip_element(reader, &child)?;
                    }
                },
                Event::Empty(child) => match name_of(&child).as_str() {
                    "VARIABLE" => job.variables.push(self.parse_variable(&child)?),
                    tag => debug!("Unsupported JOB child element {tag}"),
                },
                Event::End(_) => break,
                Event::Eof => {
                    return Err(self.malformed("unexpected end of document inside JOB"));
                }
                _ => {}
            }
        }
        Ok(job)
    }

    fn parse_variable(&self, el: &BytesStart<'_>) -> Result<VarData, ParseError> {
        Ok(VarData {
            name: self.attr(el, "NAME")?,
            value: self.attr(el, "VALUE")?,
        })
    }

    fn next_event<'a>(&self, reader: &mut Reader<&'a [u8]>) -> Result<Event<'a>, ParseError> {
        reader.read_event().map_err(|err| self.malformed(err))
    }

    fn skip_element(
        &self,
        reader: &mut Reader<&[u8]>,
        el: &BytesStart<'_>,
    ) -> Result<(), ParseError> {
        let end = el.to_end().into_owned();
        reader
            .read_to_end(end.name())
            .map(|_| ())
            .map_err(|err| self.malformed(err))
    }

    fn attr(&self, el: &BytesStart<'_>, key: &str) -> Result<Option<String>, ParseError> {
        for attr in el.attributes() {
            let attr = attr.map_err(|err| self.malformed(err))?;
            if attr.key.as_ref() == key.as_bytes() {
                let value = attr.unescape_value().map_err(|err| self.malformed(err))?;
                return Ok(Some(value.into_owned()));
            }
        }
        Ok(None)
    }

    fn required_attr(&self, el: &BytesStart<'_>, key: &str) -> Result<String, ParseError> {
        self.attr(el, key)?.ok_or_else(|| {
            self.schema(format!(
                "element {} is missing required attribute {key}",
                name_of(el)
            ))
        })
    }

    fn schema(&self, detail: impl Display) -> ParseError {
        ParseError::SchemaViolation {
            path: self.label.to_string(),
            detail: detail.to_string(),
        }
    }

    fn malformed(&self, detail: impl Display) -> ParseError {
        ParseError::Malformed {
            path: self.label.to_string(),
            detail: detail.to_string(),
        }
    }
}

fn name_of(el: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(el.name().as_ref()).into_owned()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn parse_str(content: &str) -> Result<DefTable, ParseError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.xml");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        XmlDefParser::new(&path).parse()
    }

    #[test]
    fn missing_file_is_source_unavailable() {
        let parser = XmlDefParser::new("/definitely/not/here.xml");
        assert!(matches!(
            parser.parse(),
            Err(ParseError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn parses_folders_jobs_and_variables() {
        let table = parse_str(
            r#"<?xml version="1.0" encoding="utf-8"?>
            <DEFTABLE>
              <FOLDER DATACENTER="S1" FOLDER_NAME="PLAIN" />
              <SMART_FOLDER DATACENTER="S1" FOLDER_NAME="F"
                            FOLDER_ORDER_METHOD="SYSTEM" APPLICATION="A1"
                            SUB_APPLICATION="A1-SUB" NODEID="NG" RUN_AS="svc">
                <VARIABLE NAME="%%ENV" VALUE="prod" />
                <JOB JOBNAME="J" NODEID="N1" APPLICATION="A1" TASKTYPE="Command"
                     DAYS="ALL" MEMNAME="J.sh">
                  <VARIABLE NAME="%%RETRIES" VALUE="3" />
                </JOB>
                <JOB JOBNAME="J2" TASKTYPE="Dummy" />
              </SMART_FOLDER>
            </DEFTABLE>"#,
        )
        .unwrap();

        assert_eq!(table.items.len(), 2);
        assert!(!table.items[0].is_smart());
        let DefTableItem::Smart(folder) = &table.items[1] else {
            panic!("expected a smart folder");
        };
        assert_eq!(folder.data_center, "S1");
        assert_eq!(folder.folder_name, "F");
        assert_eq!(folder.order_method.as_deref(), Some("SYSTEM"));
        assert_eq!(folder.application.as_deref(), Some("A1"));
        assert_eq!(folder.node_id.as_deref(), Some("NG"));
        assert_eq!(folder.variables.len(), 1);
        assert_eq!(folder.jobs.len(), 2);

        let job = &folder.jobs[0];
        assert_eq!(job.job_name.as_deref(), Some("J"));
        assert_eq!(job.node_id.as_deref(), Some("N1"));
        assert_eq!(job.days.as_deref(), Some("ALL"));
        assert_eq!(job.variables.len(), 1);
        assert_eq!(job.variables[0].name.as_deref(), Some("%%RETRIES"));
        assert_eq!(folder.jobs[1].task_type.as_deref(), Some("Dummy"));
    }

    #[test]
    fn wrong_root_element_is_schema_violation() {
        let err = parse_str("<TABLES><FOLDER/></TABLES>").unwrap_err();
        assert!(matches!(err, ParseError::SchemaViolation { .. }), "{err}");
    }

    #[test]
    fn unknown_table_child_is_schema_violation() {
        let err = parse_str(r#"<DEFTABLE><WORKFLOW NAME="X"/></DEFTABLE>"#).unwrap_err();
        assert!(matches!(err, ParseError::SchemaViolation { .. }), "{err}");
        assert!(err.to_string().contains("WORKFLOW"));
    }

    #[test]
    fn legacy_table_items_parse_as_plain() {
        let table = parse_str(
            r#"<DEFTABLE>
              <SCHED_TABLE DATACENTER="S1" TABLE_NAME="T">
                <JOB JOBNAME="IGNORED" />
              </SCHED_TABLE>
              <FOLDER DATACENTER="S1" FOLDER_NAME="F" />
            </DEFTABLE>"#,
        )
        .unwrap();
        assert_eq!(table.items.len(), 2);
        let DefTableItem::Plain(item) = &table.items[0] else {
            panic!("expected a plain item");
        };
        assert_eq!(item.tag, "SCHED_TABLE");
    }

    #[test]
    fn folder_without_data_center_is_schema_violation() {
        let err = parse_str(r#"<DEFTABLE><FOLDER FOLDER_NAME="F"/></DEFTABLE>"#).unwrap_err();
        assert!(matches!(err, ParseError::SchemaViolation { .. }), "{err}");
        assert!(err.to_string().contains("DATACENTER"));
    }

    #[test]
    fn truncated_document_is_malformed() {
        let err = parse_str(r#"<DEFTABLE><SMART_FOLDER DATACENTER="S1" FOLDER_NAME="F">"#)
            .unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }), "{err}");
    }

    #[test]
    fn unknown_folder_children_are_skipped() {
        let table = parse_str(
            r#"<DEFTABLE>
              <SMART_FOLDER DATACENTER="S1" FOLDER_NAME="F">
                <RULE_BASED_CALENDAR NAME="workdays" DAYS="1,2,3,4,5" />
                <JOB JOBNAME="J" />
              </SMART_FOLDER>
            </DEFTABLE>"#,
        )
        .unwrap();
        let DefTableItem::Smart(folder) = &table.items[0] else {
            panic!("expected a smart folder");
        };
        assert_eq!(folder.jobs.len(), 1);
        assert!(folder.variables.is_empty());
    }
}
