use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::DEFAULT_FILE_PAGE_SIZE;
use crate::error::Error;
use crate::mutator::{Page, PageSource};
use crate::record::record_from_json;

/// Layout of a JSON input file
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JsonFormat {
    /// One document: an array of objects or a single object
    #[default]
    Document,
    /// One object per line
    Lines,
}

#[derive(Debug)]
enum Input<R> {
    Document(std::vec::IntoIter<Value>),
    Lines { reader: R, line: usize },
}

/// Reads records from JSON or JSON Lines
///
/// A document is parsed up front and an unparseable one is an error. In JSON Lines mode a
/// line that fails to parse is rejected and reading continues. Elements that are not
/// objects are rejected in both modes.
#[derive(Debug)]
pub struct JsonSource<R> {
    input: Input<R>,
    position: usize,
}

impl JsonSource<BufReader<File>> {
    /// Open the JSON file at `path`
    pub fn open(path: impl AsRef<Path>, format: JsonFormat) -> Result<Self, Error> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file), format)
    }
}

impl<R: BufRead> JsonSource<R> {
    /// Read JSON from `reader`
    pub fn from_reader(reader: R, format: JsonFormat) -> Result<Self, Error> {
        let input = match format {
            JsonFormat::Document => {
                let document: Value = serde_json::from_reader(reader)?;
                let elements = match document {
                    Value::Array(elements) => elements,
                    object @ Value::Object(_) => vec![object],
                    _ => {
                        return Err(Error::MalformedInput(
                            "JSON document must be an array of objects or an object".to_string(),
                        ));
                    }
                };
                Input::Document(elements.into_iter())
            }
            JsonFormat::Lines => Input::Lines { reader, line: 0 },
        };
        Ok(Self { input, position: 0 })
    }
}

impl<R: BufRead> PageSource for JsonSource<R> {
    /// Number of elements or lines consumed so far
    type Token = usize;

    async fn fetch_page(
        &mut self,
        _token: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Page<usize>, Error> {
        let limit = limit.unwrap_or(DEFAULT_FILE_PAGE_SIZE).max(1);
        let mut page = Page::empty();

        match &mut self.input {
            Input::Document(elements) => {
                for element in elements.by_ref().take(limit) {
                    self.position += 1;
                    match record_from_json(element) {
                        Ok(record) => page.records.push(record),
                        Err(e) => page.rejected.push(Error::MalformedInput(format!(
                            "element {}: {e}",
                            self.position
                        ))),
                    }
                }
                if elements.len() > 0 {
                    page.next_token = Some(self.position);
                }
            }
            Input::Lines { reader, line } => {
                let mut text = String::new();
                while page.records.len() + page.rejected.len() < limit {
                    text.clear();
                    if reader.read_line(&mut text)? == 0 {
                        return Ok(page);
                    }
                    *line += 1;
                    self.position = *line;
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let parsed = serde_json::from_str::<Value>(trimmed)
                        .map_err(Error::from)
                        .and_then(record_from_json);
                    match parsed {
                        Ok(record) => page.records.push(record),
                        Err(e) => page
                            .rejected
                            .push(Error::MalformedInput(format!("line {line}: {e}"))),
                    }
                }
                page.next_token = Some(self.position);
            }
        }

        Ok(page)
    }
}
