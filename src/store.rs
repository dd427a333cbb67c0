//! On-disk persistence for surveys and their responses.
//!
//! Layout under the data directory:
//!
//! ```text
//! surveys/<id>/survey.bin.gz    survey definition (bincode + gzip)
//! surveys/<id>/source.<ext>     the spreadsheet as uploaded
//! surveys/<id>/responses.jsonl  one JSON response per line, append-only
//! users/<username>/list.json    surveys owned by a user
//! ```

use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::{self, File, OpenOptions, create_dir_all};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, SurveyError};
use crate::survey::{Response, Survey, SurveyEntry};

const SURVEYS_DIR: &str = "surveys";
const USERS_DIR: &str = "users";
const SURVEY_FILE: &str = "survey.bin.gz";
const RESPONSES_FILE: &str = "responses.jsonl";
const LIST_FILE: &str = "list.json";

pub struct SurveyStore {
    root: PathBuf,

    // Serialises response appends and index rewrites
    write_lock: Mutex<()>,
}

impl SurveyStore {
    /// Open (creating if needed) a store rooted at `root`
    ///
    /// # Arguments
    /// * `root` - The data directory; `surveys/` and `users/` are created in it
    ///
    /// # Examples
    /// ```
    /// use survey::store::SurveyStore;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let store = SurveyStore::open(dir.path()).unwrap();
    /// assert!(!store.exists("no-such-survey"));
    /// ```
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        create_dir_all(root.join(SURVEYS_DIR))?;
        create_dir_all(root.join(USERS_DIR))?;

        Ok(SurveyStore {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist a new survey along with the file it was built from
    ///
    /// # Arguments
    /// * `survey` - The parsed survey; its id names the directory
    /// * `source` - The uploaded spreadsheet bytes, kept as `source.<extension>`
    /// * `extension` - Extension of the upload, without the dot
    ///
    /// # Returns
    /// `Ok(())` once everything is on disk. A partial write removes the
    /// survey directory again.
    pub fn create(&self, survey: &Survey, source: &[u8], extension: &str) -> Result<()> {
        let dir = self.survey_dir(&survey.id)?;
        create_dir_all(&dir)?;

        let saved = save_survey(survey, &dir.join(SURVEY_FILE))
            .and_then(|_| Ok(fs::write(dir.join(format!("source.{}", extension)), source)?));
        if let Err(e) = saved {
            let _ = fs::remove_dir_all(&dir);
            return Err(e);
        }

        if let Some(owner) = &survey.owner {
            let _guard = self.lock();
            let mut entries = self.list(owner)?;
            entries.push(survey.entry());
            self.write_list(owner, &entries)?;
        }

        log::info!(
            "Stored survey {} ('{}', {} fields)",
            survey.id,
            survey.title,
            survey.fields.len()
        );
        Ok(())
    }

    pub fn exists(&self, id: &str) -> bool {
        self.survey_dir(id)
            .map(|dir| dir.join(SURVEY_FILE).is_file())
            .unwrap_or(false)
    }

    /// Load a survey definition
    ///
    /// # Returns
    /// The survey, or `NotFound` for unknown or malformed ids
    pub fn load(&self, id: &str) -> Result<Survey> {
        let path = self.survey_dir(id)?.join(SURVEY_FILE);
        if !path.is_file() {
            return Err(SurveyError::NotFound(format!("survey {}", id)));
        }
        load_survey(&path)
    }

    /// Append one response; concurrent submissions never interleave
    ///
    /// # Arguments
    /// * `response` - A response built by [`Survey::build_response`]
    ///
    /// # Returns
    /// `NotFound` if the survey is missing, otherwise `Ok(())` after the line
    /// is written and flushed
    pub fn append_response(&self, response: &Response) -> Result<()> {
        let dir = self.survey_dir(&response.survey_id)?;
        let mut line = serde_json::to_vec(response)?;
        line.push(b'\n');

        let _guard = self.lock();
        if !dir.join(SURVEY_FILE).is_file() {
            return Err(SurveyError::NotFound(format!("survey {}", response.survey_id)));
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(RESPONSES_FILE))?;
        file.write_all(&line)?;
        file.flush()?;

        Ok(())
    }

    /// All responses for a survey in submission order
    pub fn responses(&self, id: &str) -> Result<Vec<Response>> {
        let dir = self.survey_dir(id)?;
        if !dir.join(SURVEY_FILE).is_file() {
            return Err(SurveyError::NotFound(format!("survey {}", id)));
        }

        let path = dir.join(RESPONSES_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(path)?);
        let mut responses = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            responses.push(serde_json::from_str(&line)?);
        }

        Ok(responses)
    }

    /// Remove a survey, its responses and its upload, and unlist it
    ///
    /// # Errors
    /// `NotFound` if the survey does not exist, including when a concurrent
    /// delete removed it first
    pub fn delete(&self, id: &str) -> Result<()> {
        let dir = self.survey_dir(id)?;

        let _guard = self.lock();
        let survey = self.load(id)?;
        fs::remove_dir_all(&dir)?;

        if let Some(owner) = &survey.owner {
            let mut entries = self.list(owner)?;
            entries.retain(|entry| entry.id != id);
            self.write_list(owner, &entries)?;
        }

        log::info!("Deleted survey {}", id);
        Ok(())
    }

    /// Surveys owned by `username`, oldest first
    pub fn list(&self, username: &str) -> Result<Vec<SurveyEntry>> {
        let path = self.user_dir(username)?.join(LIST_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let data = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&data)?)
    }

    fn write_list(&self, username: &str, entries: &[SurveyEntry]) -> Result<()> {
        let dir = self.user_dir(username)?;
        create_dir_all(&dir)?;
        fs::write(dir.join(LIST_FILE), serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }

    fn survey_dir(&self, id: &str) -> Result<PathBuf> {
        check_path_segment(id)?;
        Ok(self.root.join(SURVEYS_DIR).join(id))
    }

    fn user_dir(&self, username: &str) -> Result<PathBuf> {
        check_path_segment(username)?;
        Ok(self.root.join(USERS_DIR).join(username))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        // The guarded data is `()`, so a poisoned lock is still usable
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn check_path_segment(segment: &str) -> Result<()> {
    let valid = !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SurveyError::NotFound(format!("'{}'", segment)))
    }
}

pub fn save_survey(survey: &Survey, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut writer = BufWriter::new(encoder);

    serialize_into(&mut writer, survey)?;

    let encoder = writer
        .into_inner()
        .map_err(|e| SurveyError::Io(e.into_error()))?;
    encoder.finish()?;

    Ok(())
}

pub fn load_survey(path: &Path) -> Result<Survey> {
    let file = File::open(path)?;
    let decoder = GzDecoder::new(file);
    let mut reader = BufReader::new(decoder);

    Ok(deserialize_from(&mut reader)?)
}
