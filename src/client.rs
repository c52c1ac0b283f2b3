//! Client for the Standard Cortical Observer Web API.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::cache::{DownloadCache, FileManager, FileStore, TempFiles};
use crate::error::ScoError;
use crate::experiment::{self, ExperimentHandle};
use crate::image_group::{self, ImageGroupHandle};
use crate::resource::ResourceHandle;
use crate::rest::{
    Links, ListingOptions, REF_DOWNLOAD, REF_EXPERIMENTS_CREATE, REF_EXPERIMENTS_LIST,
    REF_FMRI_CREATE, REF_IMAGE_GROUPS_CREATE, REF_IMAGE_GROUPS_LIST, REF_RUNS_CREATE,
    REF_RUNS_LIST, REF_SELF, REF_STATE_ACTIVE, REF_STATE_ERROR, REF_STATE_SUCCESS,
    REF_SUBJECTS_CREATE, REF_SUBJECTS_LIST, Reference, links_from_response, options_payload,
    properties_payload,
};
use crate::run::{ModelRunHandle, RunState};
use crate::store::ResourceStore;
use crate::subject::{self, SubjectHandle};
use crate::transport::{HttpTransport, Transport};

/// URL of the default SCO Web API instance hosted at NYU.
pub const DEFAULT_API_URL: &str = "http://cds-swg1.cims.nyu.edu/sco-server/api/v1";

/// Client configuration. The data directory defaults to `~/.sco`; with
/// `use_cache` disabled downloaded files land in a temporary location that
/// is removed when the client is dropped.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub data_dir: Option<Utf8PathBuf>,
    pub use_cache: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            data_dir: None,
            use_cache: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiOverview {
    links: Vec<Reference>,
}

/// Blocking client for one SCO Web API instance.
///
/// The client owns its data directory and file cache for its lifetime.
/// Concurrent use of two clients against the same data directory is
/// unsupported (last writer wins on the cache index).
pub struct ScoClient<T: Transport> {
    api_url: String,
    links: Links,
    transport: T,
    store: ResourceStore,
    files: FileStore<T>,
}

impl ScoClient<HttpTransport> {
    /// Connect to the Web API at the given URL.
    pub fn connect(api_url: &str, options: ClientOptions) -> Result<Self, ScoError> {
        Self::connect_with(HttpTransport::new()?, api_url, options)
    }
}

impl<T: Transport + Clone> ScoClient<T> {
    /// Connect using a caller-provided transport. Reads the API's HATEOAS
    /// link list, which all further operations are resolved against.
    pub fn connect_with(
        transport: T,
        api_url: &str,
        options: ClientOptions,
    ) -> Result<Self, ScoError> {
        let store = match options.data_dir {
            Some(root) => ResourceStore::new(root),
            None => ResourceStore::default_location()?,
        };
        store.ensure_root()?;
        let body = transport.get_json(api_url)?;
        let overview: ApiOverview = serde_json::from_value(body)
            .map_err(|err| ScoError::ResourceUnavailable(err.to_string()))?;
        let links = Links::from_references(&overview.links);
        let files = if options.use_cache {
            FileStore::Cache(DownloadCache::new(transport.clone(), store.cache_dir())?)
        } else {
            FileStore::Temp(TempFiles::new(transport.clone())?)
        };
        info!(api_url, root = %store.root(), "connected to SCO Web API");
        Ok(Self {
            api_url: api_url.to_string(),
            links,
            transport,
            store,
            files,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn store(&self) -> &ResourceStore {
        &self.store
    }

    /// Download the file behind a resource's download URL through the
    /// client's file manager.
    pub fn get_file(&self, url: &str) -> Result<Utf8PathBuf, ScoError> {
        self.files.get_file(url)
    }

    // ------------------------------------------------------------------
    // Subjects
    // ------------------------------------------------------------------

    pub fn subjects_list(
        &self,
        options: &ListingOptions,
    ) -> Result<Vec<ResourceHandle>, ScoError> {
        crate::rest::get_resource_listing(&self.transport, self.links.get(REF_SUBJECTS_LIST)?, options)
    }

    /// Fetch a subject by its self URL and materialize its anatomy data.
    pub fn subjects_get(&self, url: &str) -> Result<SubjectHandle, ScoError> {
        SubjectHandle::fetch(&self.transport, &self.store, url)
    }

    /// Upload a local tar archive as a new subject.
    pub fn subjects_create(
        &self,
        file: &Utf8Path,
        properties: Option<&Value>,
    ) -> Result<SubjectHandle, ScoError> {
        let url = subject::create(
            &self.transport,
            self.links.get(REF_SUBJECTS_CREATE)?,
            file,
            properties,
        )?;
        self.subjects_get(&url)
    }

    // ------------------------------------------------------------------
    // Image groups
    // ------------------------------------------------------------------

    pub fn image_groups_list(
        &self,
        options: &ListingOptions,
    ) -> Result<Vec<ResourceHandle>, ScoError> {
        crate::rest::get_resource_listing(
            &self.transport,
            self.links.get(REF_IMAGE_GROUPS_LIST)?,
            options,
        )
    }

    /// Fetch an image group by its self URL and materialize its images.
    pub fn image_groups_get(&self, url: &str) -> Result<ImageGroupHandle, ScoError> {
        ImageGroupHandle::fetch(&self.transport, &self.store, url)
    }

    /// Upload a local tar archive as a new image group, optionally applying
    /// options and properties to the created resource.
    pub fn image_groups_create(
        &self,
        file: &Utf8Path,
        options: Option<&Value>,
        properties: Option<&Value>,
    ) -> Result<ImageGroupHandle, ScoError> {
        let url = image_group::create(
            &self.transport,
            self.links.get(REF_IMAGE_GROUPS_CREATE)?,
            file,
            options,
            properties,
        )?;
        self.image_groups_get(&url)
    }

    // ------------------------------------------------------------------
    // Experiments
    // ------------------------------------------------------------------

    pub fn experiments_list(
        &self,
        options: &ListingOptions,
    ) -> Result<Vec<ResourceHandle>, ScoError> {
        crate::rest::get_resource_listing(
            &self.transport,
            self.links.get(REF_EXPERIMENTS_LIST)?,
            options,
        )
    }

    /// Fetch an experiment by its self URL, eagerly resolving its subject
    /// and image group.
    pub fn experiments_get(&self, url: &str) -> Result<ExperimentHandle, ScoError> {
        ExperimentHandle::fetch(&self.transport, &self.files, &self.store, url)
    }

    /// Create an experiment for an existing subject/image-group pairing.
    pub fn experiments_create(
        &self,
        name: &str,
        subject_id: &str,
        image_group_id: &str,
        properties: Option<&Value>,
    ) -> Result<ExperimentHandle, ScoError> {
        let url = experiment::create(
            &self.transport,
            self.links.get(REF_EXPERIMENTS_CREATE)?,
            name,
            subject_id,
            image_group_id,
            properties,
        )?;
        self.experiments_get(&url)
    }

    /// Upload a functional MRI data file for an experiment. Returns the URL
    /// of the created fMRI resource.
    pub fn experiments_fmri_create(
        &self,
        experiment_url: &str,
        file: &Utf8Path,
    ) -> Result<String, ScoError> {
        let body = self.transport.get_json(experiment_url)?;
        let resource = ResourceHandle::from_json(body)?;
        let response = self
            .transport
            .upload_file(resource.links.get(REF_FMRI_CREATE)?, file)?;
        let links = links_from_response(&response)?;
        Ok(links.get(REF_SELF)?.to_string())
    }

    // ------------------------------------------------------------------
    // Model runs
    // ------------------------------------------------------------------

    /// Request a new model run for an experiment. The run starts in state
    /// IDLE.
    pub fn experiments_run(
        &self,
        experiment: &ExperimentHandle,
        name: &str,
        arguments: Option<&Value>,
        properties: Option<&Value>,
    ) -> Result<ModelRunHandle, ScoError> {
        let mut body = json!({ "name": name });
        if let Some(arguments) = arguments {
            body["arguments"] = Value::Array(options_payload(arguments)?);
        }
        if let Some(properties) = properties {
            body["properties"] = Value::Array(properties_payload(properties)?);
        }
        let response = self
            .transport
            .post_json(experiment.resource.links.get(REF_RUNS_CREATE)?, &body)?;
        let links = links_from_response(&response)?;
        self.runs_get(links.get(REF_SELF)?)
    }

    pub fn runs_list(
        &self,
        experiment: &ExperimentHandle,
        options: &ListingOptions,
    ) -> Result<Vec<ResourceHandle>, ScoError> {
        crate::rest::get_resource_listing(
            &self.transport,
            experiment.resource.links.get(REF_RUNS_LIST)?,
            options,
        )
    }

    pub fn runs_get(&self, url: &str) -> Result<ModelRunHandle, ScoError> {
        let body = self.transport.get_json(url)?;
        ModelRunHandle::from_json(body)
    }

    /// Transition a run from IDLE to RUNNING. The transition is validated
    /// locally before any request is sent; the returned handle reflects the
    /// server's state after the change.
    pub fn runs_update_active(&self, run: &ModelRunHandle) -> Result<ModelRunHandle, ScoError> {
        run.state.ensure_transition(RunState::Running)?;
        self.transport
            .post_json(run.resource.links.get(REF_STATE_ACTIVE)?, &json!({}))?;
        self.runs_get(run.url())
    }

    /// Transition a run from RUNNING to SUCCESS by uploading its result
    /// file.
    pub fn runs_update_success(
        &self,
        run: &ModelRunHandle,
        result_file: &Utf8Path,
    ) -> Result<ModelRunHandle, ScoError> {
        run.state.ensure_transition(RunState::Success)?;
        self.transport
            .upload_file(run.resource.links.get(REF_STATE_SUCCESS)?, result_file)?;
        self.runs_get(run.url())
    }

    /// Transition a run from RUNNING to FAILED with a non-empty list of
    /// error messages.
    pub fn runs_update_error(
        &self,
        run: &ModelRunHandle,
        errors: &[String],
    ) -> Result<ModelRunHandle, ScoError> {
        run.state.ensure_transition(RunState::Failed)?;
        if errors.is_empty() {
            return Err(ScoError::EmptyErrorList);
        }
        self.transport
            .post_json(run.resource.links.get(REF_STATE_ERROR)?, &json!({ "errors": errors }))?;
        self.runs_get(run.url())
    }

    /// Fetch the result file of a successful run through the client's file
    /// manager.
    pub fn runs_result_file(&self, run: &ModelRunHandle) -> Result<Utf8PathBuf, ScoError> {
        self.files.get_file(run.resource.links.get(REF_DOWNLOAD)?)
    }
}
