use crate::errors::StreamerError;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Default, Deserialize)]
pub struct Setting {
    #[serde(default)]
    pub runtime: Runtime,
    #[serde(default)]
    pub http: Http,
    #[serde(default)]
    pub stream: Stream,
    #[serde(default)]
    pub manifest: Manifest,
}

#[derive(Debug, Default, Deserialize)]
pub struct Runtime {
    pub threads: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    #[serde(default = "Http::default_addr")]
    pub addr: String,
    /// hyper max_buf_size, default when unset or zero
    pub buffer: Option<usize>,
    /// Segment responses may be cached for this many target durations.
    #[serde(default = "Http::default_cache_segments")]
    pub cache_segments: u64,
}

impl Http {
    fn default_addr() -> String {
        ":8443".to_string()
    }

    fn default_cache_segments() -> u64 {
        3
    }
}

impl Default for Http {
    fn default() -> Self {
        Http {
            addr: Http::default_addr(),
            buffer: None,
            cache_segments: Http::default_cache_segments(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Stream {
    /// Media units per second.
    #[serde(default = "Stream::default_time_scale")]
    pub time_scale: u32,
    /// Duration of every segment in time_scale units.
    #[serde(default = "Stream::default_segment_duration")]
    pub segment_duration: u64,
    /// Live window in seconds.
    #[serde(default = "Stream::default_window_duration")]
    pub window_duration: u64,
    #[serde(default)]
    pub segments: Vec<String>,
}

impl Stream {
    fn default_time_scale() -> u32 {
        1000
    }

    fn default_segment_duration() -> u64 {
        2000
    }

    fn default_window_duration() -> u64 {
        30
    }
}

impl Default for Stream {
    fn default() -> Self {
        Stream {
            time_scale: Stream::default_time_scale(),
            segment_duration: Stream::default_segment_duration(),
            window_duration: Stream::default_window_duration(),
            segments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub store: StoreKind,
    /// Index file written by the file store.
    #[serde(default = "Manifest::default_path")]
    pub path: String,
    /// Playlist name advertised to clients.
    #[serde(default = "Manifest::default_name")]
    pub name: String,
}

impl Manifest {
    fn default_path() -> String {
        "index-file".to_string()
    }

    fn default_name() -> String {
        "media.m3u8".to_string()
    }

    pub fn config(&self) -> StoreConfig {
        match self.store {
            StoreKind::Memory => StoreConfig::Memory,
            StoreKind::File => StoreConfig::File(PathBuf::from(&self.path)),
        }
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Manifest {
            store: StoreKind::default(),
            path: Manifest::default_path(),
            name: Manifest::default_name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Memory,
    File(PathBuf),
}

/// Values given on the command line, applied on top of the file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub addr: Option<String>,
    pub threads: Option<usize>,
    pub time_scale: Option<u32>,
    pub segment_duration: Option<u64>,
    pub window_duration: Option<u64>,
    pub segments: Vec<String>,
}

/// Validated stream parameters, durations in time_scale units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    pub time_scale: u32,
    pub segment_duration: u64,
    pub window_duration: u64,
    pub segments: Vec<PathBuf>,
}

impl Setting {
    pub fn load(path: &str) -> Result<Setting, StreamerError> {
        let data = fs::read_to_string(path).map_err(|_| {
            StreamerError::ConfigError(format!("Config file '{}' does not exist", path))
        })?;

        Setting::parse(&data)
    }

    pub fn parse(data: &str) -> Result<Setting, StreamerError> {
        toml::from_str(data)
            .map_err(|e| StreamerError::ConfigError(format!("Invalid configuration: {}", e)))
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Setting {
        if let Some(addr) = overrides.addr {
            self.http.addr = addr;
        }
        if overrides.threads.is_some() {
            self.runtime.threads = overrides.threads;
        }
        if let Some(time_scale) = overrides.time_scale {
            self.stream.time_scale = time_scale;
        }
        if let Some(segment_duration) = overrides.segment_duration {
            self.stream.segment_duration = segment_duration;
        }
        if let Some(window_duration) = overrides.window_duration {
            self.stream.window_duration = window_duration;
        }
        if !overrides.segments.is_empty() {
            self.stream.segments = overrides.segments;
        }

        self
    }

    pub fn stream_settings(&self) -> Result<StreamSettings, StreamerError> {
        let stream = &self.stream;
        if stream.time_scale == 0 {
            return Err(StreamerError::ConfigError(
                "time_scale must be positive".to_string(),
            ));
        }
        if stream.segment_duration == 0 {
            return Err(StreamerError::ConfigError(
                "segment_duration must be positive".to_string(),
            ));
        }
        if stream.window_duration == 0 {
            return Err(StreamerError::ConfigError(
                "window_duration must be positive".to_string(),
            ));
        }
        if stream.segments.is_empty() {
            return Err(StreamerError::ConfigError(
                "no segments given".to_string(),
            ));
        }
        if self.http.cache_segments == 0 {
            return Err(StreamerError::ConfigError(
                "cache_segments must be positive".to_string(),
            ));
        }

        let window_duration = stream
            .window_duration
            .checked_mul(stream.time_scale as u64)
            .ok_or_else(|| {
                StreamerError::ConfigError("window_duration is too large".to_string())
            })?;

        Ok(StreamSettings {
            time_scale: stream.time_scale,
            segment_duration: stream.segment_duration,
            window_duration,
            segments: stream.segments.iter().map(PathBuf::from).collect(),
        })
    }
}
