//! soda4LCA service API: endpoint parsing, process search and the remote
//! medium built on the process `zipexport`.

use std::collections::VecDeque;

use tracing::{debug, info, instrument};

use crate::ilcd::epd::config::HttpSettings;
use crate::ilcd::epd::error::{IlcdError, Result};
use crate::ilcd::epd::medium::archive::ZipMedium;
use crate::ilcd::epd::medium::http::{ApiClient, encode_segment};
use crate::ilcd::epd::medium::{Attachment, Medium, digital_file_name};
use crate::ilcd::epd::model::{
    Category, DatasetRef, DatasetType, ListResponseMeta, ProcessBasicInfo,
};
use crate::ilcd::epd::xml::{self, Element};

/// Location of one dataset on a soda4LCA server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePointer {
    /// Resource root, always ending in `/resource`.
    pub base_url: String,
    pub reference: DatasetRef,
    pub data_stock: Option<String>,
}

impl RemotePointer {
    /// Parses the URL forms soda4LCA exposes for a dataset:
    ///
    /// * `.../resource/processes/<uuid>?version=...` (with any suffix such as `/zipexport`)
    /// * `.../resource/datastocks/<stock>/processes/<uuid>`
    /// * `.../showProcess.xhtml?uuid=...&version=...`
    /// * `.../datasetdetail/process.xhtml?uuid=...`
    pub fn parse(endpoint: &str) -> Result<Self> {
        let invalid = || IlcdError::InvalidEndpoint(endpoint.to_string());
        let url = url::Url::parse(endpoint).map_err(|_| invalid())?;
        let host = url.host_str().ok_or_else(invalid)?;
        let mut origin = format!("{}://{host}", url.scheme());
        if let Some(port) = url.port() {
            origin.push_str(&format!(":{port}"));
        }

        let query = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
                .filter(|value| !value.is_empty())
        };

        let path = url.path();
        let mut data_stock = None;
        let (resource_path, type_name, id) = if path.ends_with(".xhtml") {
            let (parent, page) = path.rsplit_once('/').ok_or_else(invalid)?;
            let type_name = page.trim_end_matches(".xhtml").to_ascii_lowercase();
            let prefix = match path.split_once("/datasetdetail") {
                Some((prefix, _)) => prefix,
                None => parent,
            };
            (format!("{prefix}/resource"), type_name, query("uuid"))
        } else {
            let segments: Vec<&str> = path.split('/').collect();
            let position = segments
                .iter()
                .position(|segment| *segment == "resource")
                .ok_or_else(invalid)?;
            let prefix = segments[..position].join("/");
            let mut type_name = segments.get(position + 1).map(|s| s.to_string());
            let mut id = segments.get(position + 2).map(|s| s.to_string());
            if type_name.as_deref() == Some("datastocks") {
                data_stock = id;
                type_name = segments.get(position + 3).map(|s| s.to_string());
                id = segments.get(position + 4).map(|s| s.to_string());
            }
            (
                format!("{prefix}/resource"),
                type_name.ok_or_else(invalid)?,
                id.filter(|id| !id.is_empty()),
            )
        };

        let dataset_type = DatasetType::from_folder(&type_name).ok_or_else(invalid)?;
        let id = id.ok_or_else(invalid)?;
        Ok(Self {
            base_url: format!("{origin}{resource_path}"),
            reference: DatasetRef::new(dataset_type, id, query("version")),
            data_stock: data_stock.or_else(|| query("datastock")),
        })
    }
}

/// Search criteria for [`Soda4LcaClient::search_processes`].
#[derive(Debug, Clone, Default)]
pub struct ProcessQuery {
    /// Two letter language code; results fall back to other languages.
    pub lang: Option<String>,
    /// Additional service API parameters such as `name` or `classId`.
    pub params: Vec<(String, String)>,
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSearchPage {
    pub meta: ListResponseMeta,
    pub items: Vec<ProcessBasicInfo>,
}

/// Client for the soda4LCA service API.
#[derive(Debug)]
pub struct Soda4LcaClient {
    api: ApiClient,
}

impl Soda4LcaClient {
    /// `base_url` is the server's resource root; `/resource` is appended
    /// when missing.
    pub fn new(base_url: &str, settings: &HttpSettings) -> Result<Self> {
        let base_url = normalize_base_url(base_url);
        url::Url::parse(&base_url).map_err(|_| IlcdError::InvalidEndpoint(base_url.clone()))?;
        let api = ApiClient::new(&base_url, settings)?;
        Ok(Self { api })
    }

    pub fn base_url(&self) -> &str {
        self.api.base_url()
    }

    /// Fetches one page of processes.
    pub fn search_processes(
        &self,
        query: &ProcessQuery,
        offset: usize,
        page_size: usize,
    ) -> Result<ProcessSearchPage> {
        let offset = offset.to_string();
        let page_size = page_size.to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("format", "xml"),
            ("startIndex", &offset),
            ("pageSize", &page_size),
            ("search", "true"),
        ];
        params.extend(query.params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(lang) = &query.lang {
            params.push(("lang", lang));
            params.push(("langFallback", "true"));
        }
        let body = self.api.get("processes", &params)?;
        parse_search_response(&body)
    }

    /// Iterates over every process matching `query`.
    pub fn processes<'a>(
        &'a self,
        query: &'a ProcessQuery,
        page_size: usize,
    ) -> ProcessPages<impl FnMut(usize) -> Result<ProcessSearchPage> + 'a> {
        ProcessPages::new(
            move |offset| self.search_processes(query, offset, page_size),
            0,
        )
    }

    /// Flat list of the process categories of `category_system`: the top
    /// level categories followed by their subcategories.
    pub fn list_categories(&self, category_system: &str, lang: &str) -> Result<Vec<Category>> {
        let params = [("format", "xml"), ("lang", lang), ("catSystem", category_system)];
        let top = parse_category_response(&self.api.get("processes/categories", &params)?, None)?;
        let mut result = top.clone();
        for category in &top {
            let path = format!(
                "processes/categories/{}/subcategories",
                encode_segment(&category.name)
            );
            result.extend(parse_category_response(&self.api.get(&path, &params)?, Some(category))?);
        }
        debug!(category_system, categories = result.len(), "listed categories");
        Ok(result)
    }

    /// Downloads the zip export of a dataset and its dependencies.
    pub fn export_to_zip(&self, reference: &DatasetRef, data_stock: Option<&str>) -> Result<Vec<u8>> {
        let path = format!(
            "{}/{}/zipexport",
            reference.dataset_type.folder(),
            encode_segment(&reference.id)
        );
        let mut params: Vec<(&str, &str)> = vec![("format", "zip")];
        if let Some(stock) = data_stock {
            params.push(("stock", stock));
        }
        if let Some(version) = &reference.version {
            params.push(("version", version));
        }
        self.api.get(&path, &params)
    }

    /// Link to the EPD document of a process, `None` when the server has
    /// none.
    pub fn epd_document_link(&self, process_id: &str, version: Option<&str>) -> Result<Option<String>> {
        let url = with_version(
            format!("{}/processes/{}/epd", self.base_url(), encode_segment(process_id)),
            version,
        );
        Ok(self.api.head_ok(&url)?.then_some(url))
    }

    pub fn download_epd_document(&self, process_id: &str, version: Option<&str>) -> Result<Vec<u8>> {
        let link = self.epd_document_link(process_id, version)?.ok_or_else(|| {
            IlcdError::NotFound(format!("EPD document of process {process_id}"))
        })?;
        self.api.get(&link, &[])
    }

    /// URL of a dataset or of a digital file attached to it.
    pub fn entity_url(&self, reference: &DatasetRef, digital_file: Option<&str>) -> String {
        let mut url = format!(
            "{}/{}/{}",
            self.base_url(),
            reference.dataset_type.folder(),
            encode_segment(&reference.id)
        );
        if let Some(file) = digital_file {
            url.push('/');
            url.push_str(&encode_segment(digital_file_name(file)));
        }
        with_version(url, reference.version.as_deref())
    }

    /// GETs a single dataset as XML.
    pub fn fetch_dataset(&self, reference: &DatasetRef) -> Result<Vec<u8>> {
        let path = format!(
            "{}/{}",
            reference.dataset_type.folder(),
            encode_segment(&reference.id)
        );
        let mut params: Vec<(&str, &str)> = vec![("format", "xml")];
        if let Some(version) = &reference.version {
            params.push(("version", version));
        }
        self.api.get(&path, &params)
    }

    pub fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.api.get(url, &[])
    }
}

/// Adds `version` as an encoded query parameter.
fn with_version(url: String, version: Option<&str>) -> String {
    let Some(version) = version else {
        return url;
    };
    match url::Url::parse(&url) {
        Ok(mut parsed) => {
            parsed.query_pairs_mut().append_pair("version", version);
            parsed.into()
        }
        Err(_) => url,
    }
}

fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.ends_with("/resource") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/resource")
    }
}

/// Parses a service API process list.
pub fn parse_search_response(bytes: &[u8]) -> Result<ProcessSearchPage> {
    let root = xml::parse_document(bytes, "process search response")?;
    let number = |name: &str| {
        root.attr(name)
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0)
    };
    let meta = ListResponseMeta {
        offset: number("sapi:startIndex"),
        page_size: number("sapi:pageSize"),
        total_items_count: number("sapi:totalSize"),
    };
    let items = root
        .find_all("p:process")
        .into_iter()
        .filter_map(process_info)
        .collect();
    Ok(ProcessSearchPage { meta, items })
}

/// Parses a soda4LCA 4.x category list. Entries become children of
/// `parent` when given.
pub fn parse_category_response(bytes: &[u8], parent: Option<&Category>) -> Result<Vec<Category>> {
    let root = xml::parse_document(bytes, "category response")?;
    Ok(root
        .find_all("sapi:category")
        .into_iter()
        .filter_map(|element| {
            let name = element.text()?.trim().to_string();
            if name.is_empty() {
                return None;
            }
            let mut full_path = parent.map(|parent| parent.full_path.clone()).unwrap_or_default();
            full_path.push(name.clone());
            Some(Category {
                id: element
                    .attr("classId")
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string),
                name,
                parent_id: parent.and_then(|parent| parent.id.clone()),
                full_path,
            })
        })
        .collect())
}

fn process_info(process: &Element) -> Option<ProcessBasicInfo> {
    let text = |path: &str| process.find_text(path).map(str::to_string);
    Some(ProcessBasicInfo {
        uuid: text("sapi:uuid")?,
        name: text("sapi:name"),
        version: text("sapi:dataSetVersion"),
        class_id: text("sapi:classId"),
        class_name: text("sapi:classific"),
        classification_system: text("sapi:classificSystem"),
        process_type: text("p:type"),
        sub_type: text("sapi:other/epd:subType"),
    })
}

/// Walks search result pages until an empty page or the reported total.
pub struct ProcessPages<F> {
    fetch: F,
    offset: usize,
    buffer: VecDeque<ProcessBasicInfo>,
    done: bool,
}

impl<F> ProcessPages<F>
where
    F: FnMut(usize) -> Result<ProcessSearchPage>,
{
    pub fn new(fetch: F, offset: usize) -> Self {
        Self {
            fetch,
            offset,
            buffer: VecDeque::new(),
            done: false,
        }
    }
}

impl<F> Iterator for ProcessPages<F>
where
    F: FnMut(usize) -> Result<ProcessSearchPage>,
{
    type Item = Result<ProcessBasicInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.buffer.is_empty() {
            if self.done {
                return None;
            }
            let page = match (self.fetch)(self.offset) {
                Ok(page) => page,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };
            let received = page.items.len();
            self.offset += received;
            let total = page.meta.total_items_count;
            self.done = received == 0 || (total > 0 && self.offset >= total);
            debug!(received, offset = self.offset, total, "fetched search page");
            self.buffer.extend(page.items);
        }
        self.buffer.pop_front().map(Ok)
    }
}

/// Remote medium for one soda4LCA process.
///
/// The process zip export is downloaded once; datasets missing from it are
/// requested individually.
#[derive(Debug)]
pub struct Soda4LcaMedium {
    endpoint: String,
    pointer: RemotePointer,
    client: Soda4LcaClient,
    archive: ZipMedium,
}

impl Soda4LcaMedium {
    #[instrument(level = "info", skip(settings))]
    pub fn open(endpoint: &str, settings: &HttpSettings) -> Result<Self> {
        let pointer = RemotePointer::parse(endpoint)?;
        if pointer.reference.dataset_type != DatasetType::Process {
            return Err(IlcdError::InvalidEndpoint(format!(
                "{endpoint} (must point to a process)"
            )));
        }
        let client = Soda4LcaClient::new(&pointer.base_url, settings)?;
        let bytes = client.export_to_zip(&pointer.reference, pointer.data_stock.as_deref())?;
        info!(bytes = bytes.len(), "downloaded zip export");
        let archive = ZipMedium::from_bytes(bytes, endpoint)?.with_source(
            Some(client.base_url().to_string()),
            Some(pointer.reference.clone()),
        );
        Ok(Self {
            endpoint: endpoint.to_string(),
            pointer,
            client,
            archive,
        })
    }

    pub fn pointer(&self) -> &RemotePointer {
        &self.pointer
    }

    pub fn client(&self) -> &Soda4LcaClient {
        &self.client
    }
}

impl Medium for Soda4LcaMedium {
    fn describe(&self) -> String {
        format!("soda4LCA {}", self.endpoint)
    }

    fn open(&self, reference: &DatasetRef) -> Result<Vec<u8>> {
        match self.archive.open(reference) {
            Err(err) if err.is_not_found() => {
                debug!(%reference, "dataset not in export, fetching");
                self.client.fetch_dataset(reference)
            }
            other => other,
        }
    }

    fn open_attachment(&self, reference: &DatasetRef, attachment: &Attachment) -> Result<Vec<u8>> {
        match attachment {
            Attachment::EpdDocument => self
                .client
                .download_epd_document(&reference.id, reference.version.as_deref()),
            Attachment::DigitalFile(uri) => {
                if self.archive.has_external_doc(uri) {
                    return self.archive.open_attachment(reference, attachment);
                }
                let url = self.client.entity_url(reference, Some(uri));
                self.client.download(&url)
            }
        }
    }

    fn exists(&self, reference: &DatasetRef) -> bool {
        self.archive.exists(reference)
    }

    fn list(&self, dataset_type: DatasetType) -> Result<Vec<DatasetRef>> {
        self.archive.list(dataset_type)
    }

    fn resolve_url(&self, reference: &DatasetRef, digital_file: Option<&str>) -> Option<String> {
        Some(self.client.entity_url(reference, digital_file))
    }

    fn source_url(&self) -> Option<&str> {
        Some(&self.endpoint)
    }

    fn default_process(&self) -> Option<DatasetRef> {
        self.archive.default_process()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_show_process_pages() {
        let pointer = RemotePointer::parse(
            "https://data.environdec.com/showProcess.xhtml?uuid=bfeb8678-b3cb-4a5b-b8cb-2512b551ad17&version=01.00.001&stock=Environdata",
        )
        .expect("pointer parsed");
        assert_eq!(pointer.base_url, "https://data.environdec.com/resource");
        assert_eq!(pointer.reference.dataset_type, DatasetType::Process);
        assert_eq!(pointer.reference.id, "bfeb8678-b3cb-4a5b-b8cb-2512b551ad17");
        assert_eq!(pointer.reference.version.as_deref(), Some("01.00.001"));
        assert_eq!(pointer.data_stock, None);
    }

    #[test]
    fn parses_resource_urls() {
        let pointer = RemotePointer::parse(
            "https://epdireland.lca-data.com/resource/processes/f256594a-a7bf-4bbb-91d0-65be256377c0/zipexport?version=00.03.001",
        )
        .expect("pointer parsed");
        assert_eq!(pointer.base_url, "https://epdireland.lca-data.com/resource");
        assert_eq!(pointer.reference.id, "f256594a-a7bf-4bbb-91d0-65be256377c0");
        assert_eq!(pointer.reference.version.as_deref(), Some("00.03.001"));

        let pointer = RemotePointer::parse(
            "https://oekobaudat.de/OEKOBAU.DAT/resource/datastocks/cd2bda71/processes/2eb43850?version=00.01.000",
        )
        .expect("pointer parsed");
        assert_eq!(pointer.base_url, "https://oekobaudat.de/OEKOBAU.DAT/resource");
        assert_eq!(pointer.data_stock.as_deref(), Some("cd2bda71"));
        assert_eq!(pointer.reference.id, "2eb43850");

        let pointer = RemotePointer::parse(
            "https://oekobaudat.de/OEKOBAU.DAT/datasetdetail/process.xhtml?uuid=2eb43850",
        )
        .expect("pointer parsed");
        assert_eq!(pointer.base_url, "https://oekobaudat.de/OEKOBAU.DAT/resource");
        assert_eq!(pointer.reference.version, None);
    }

    #[test]
    fn rejects_unusable_endpoints() {
        for endpoint in [
            "not a url",
            "https://host.tld/resource/processes",
            "https://host.tld/showProcess.xhtml",
            "https://host.tld/resource/widgets/abc",
            "https://host.tld/about",
        ] {
            let err = RemotePointer::parse(endpoint).expect_err("endpoint rejected");
            assert!(matches!(err, IlcdError::InvalidEndpoint(_)), "{endpoint}");
        }
    }

    const SEARCH: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sapi:dataSetList xmlns:sapi="http://www.ilcd-network.org/ILCD/ServiceAPI"
    xmlns:p="http://www.ilcd-network.org/ILCD/ServiceAPI/Process"
    xmlns:epd="http://www.iai.kit.edu/EPD/2013"
    sapi:totalSize="3" sapi:startIndex="0" sapi:pageSize="2">
  <p:process>
    <sapi:uuid>0a1b</sapi:uuid>
    <sapi:name xml:lang="en">Concrete C30/37</sapi:name>
    <sapi:dataSetVersion>00.02.000</sapi:dataSetVersion>
    <sapi:classific>Mineral building products</sapi:classific>
    <p:type>EPD</p:type>
    <sapi:other><epd:subType>average dataset</epd:subType></sapi:other>
  </p:process>
  <p:process>
    <sapi:uuid>0a1c</sapi:uuid>
  </p:process>
  <p:process>
    <sapi:name>no identifier</sapi:name>
  </p:process>
</sapi:dataSetList>"#;

    #[test]
    fn parses_search_responses() {
        let page = parse_search_response(SEARCH.as_bytes()).expect("response parsed");
        assert_eq!(page.meta.total_items_count, 3);
        assert_eq!(page.meta.page_size, 2);
        assert_eq!(page.items.len(), 2);
        let first = &page.items[0];
        assert_eq!(first.name.as_deref(), Some("Concrete C30/37"));
        assert_eq!(first.process_type.as_deref(), Some("EPD"));
        assert_eq!(first.sub_type.as_deref(), Some("average dataset"));
        assert_eq!(first.to_ref().version.as_deref(), Some("00.02.000"));
    }

    fn page(ids: &[&str], total: usize) -> ProcessSearchPage {
        ProcessSearchPage {
            meta: ListResponseMeta {
                offset: 0,
                page_size: 2,
                total_items_count: total,
            },
            items: ids
                .iter()
                .map(|id| ProcessBasicInfo {
                    uuid: id.to_string(),
                    name: None,
                    version: None,
                    class_id: None,
                    class_name: None,
                    classification_system: None,
                    process_type: None,
                    sub_type: None,
                })
                .collect(),
        }
    }

    #[test]
    fn pages_until_total_is_reached() {
        let mut offsets = Vec::new();
        let pages = ProcessPages::new(
            |offset| {
                offsets.push(offset);
                Ok(match offset {
                    0 => page(&["a", "b"], 3),
                    2 => page(&["c"], 3),
                    _ => page(&["unexpected"], 3),
                })
            },
            0,
        );
        let ids: Vec<String> = pages
            .map(|item| item.expect("item fetched").uuid)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(offsets, vec![0, 2]);
    }

    #[test]
    fn stops_on_empty_page_and_errors() {
        let pages = ProcessPages::new(
            |offset| match offset {
                0 => Ok(page(&["a"], 0)),
                _ => Ok(page(&[], 0)),
            },
            0,
        );
        assert_eq!(pages.count(), 1);

        let mut pages = ProcessPages::new(|_| Err(IlcdError::Transport("offline".into())), 0);
        assert!(pages.next().expect("error yielded").is_err());
        assert!(pages.next().is_none());
    }

    #[test]
    fn builds_entity_urls() {
        let client = Soda4LcaClient::new("https://host.tld", &HttpSettings::default())
            .expect("client built");
        assert_eq!(client.base_url(), "https://host.tld/resource");
        let source = DatasetRef::new(DatasetType::Source, "s1", Some("01.00.000".into()));
        assert_eq!(
            client.entity_url(&source, Some("../external_docs/EPD report.pdf")),
            "https://host.tld/resource/sources/s1/EPD%20report.pdf?version=01.00.000"
        );
        assert_eq!(
            client.entity_url(&DatasetRef::process("p1", None), None),
            "https://host.tld/resource/processes/p1"
        );
        assert_eq!(
            client.entity_url(
                &DatasetRef::process("p1", Some("01.00.000 draft&lang=de".into())),
                None
            ),
            "https://host.tld/resource/processes/p1?version=01.00.000+draft%26lang%3Dde"
        );
        let err = Soda4LcaClient::new("not a url", &HttpSettings::default())
            .expect_err("base URL rejected");
        assert!(matches!(err, IlcdError::InvalidEndpoint(_)));
    }

    const CATEGORIES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sapi:categoryInformation xmlns:sapi="http://www.ilcd-network.org/ILCD/ServiceAPI"
    sapi:dataType="Process">
  <sapi:category classId="1">Mineral building products</sapi:category>
  <sapi:category classId="2">Insulation materials</sapi:category>
  <sapi:category classId="3"> </sapi:category>
</sapi:categoryInformation>"#;

    const SUBCATEGORIES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sapi:categoryInformation xmlns:sapi="http://www.ilcd-network.org/ILCD/ServiceAPI">
  <sapi:category classId="1.4">Mortar and concrete</sapi:category>
  <sapi:category>Bricks</sapi:category>
</sapi:categoryInformation>"#;

    #[test]
    fn parses_category_responses() {
        let top = parse_category_response(CATEGORIES.as_bytes(), None).expect("response parsed");
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].id.as_deref(), Some("1"));
        assert_eq!(top[0].name, "Mineral building products");
        assert_eq!(top[0].parent_id, None);
        assert_eq!(top[1].full_path, vec!["Insulation materials"]);

        let children =
            parse_category_response(SUBCATEGORIES.as_bytes(), Some(&top[0])).expect("response parsed");
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].parent_id.as_deref(), Some("1"));
        assert_eq!(
            children[0].full_path,
            vec!["Mineral building products", "Mortar and concrete"]
        );
        assert_eq!(children[1].id, None);

        let err = parse_category_response(b"<html>", None).expect_err("not xml");
        assert_eq!(err.kind(), crate::ilcd::epd::error::ErrorKind::MalformedDocument);
    }
}
