//! Session Context
//!
//! Everything one user has done since logging in: who they are, the table
//! uploaded to each dataset tab and the filter controls last chosen there.
//! Sessions own their data outright; nothing is shared between them.

use crate::error::{ClaimsError, Result};
use crate::normalizer::{available_products, available_years, ClaimsTable};
use crate::pipeline::{AnalysisSelection, ClaimsPipeline, DashboardOutput};
use crate::schema::DatasetSchema;
use crate::security::CredentialVerifier;
use chrono::NaiveDateTime;
use polars::prelude::DataFrame;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

/// One dataset tab: its pipeline, the current upload and selection.
pub struct DatasetTab {
    pipeline: ClaimsPipeline,
    table: Option<ClaimsTable>,
    selection: Option<AnalysisSelection>,
}

impl DatasetTab {
    pub fn table(&self) -> Option<&ClaimsTable> {
        self.table.as_ref()
    }

    pub fn selection(&self) -> Option<&AnalysisSelection> {
        self.selection.as_ref()
    }
}

pub struct Session {
    id: Uuid,
    user: Option<String>,
    tabs: BTreeMap<String, DatasetTab>,
}

impl Session {
    /// A session with one tab per schema, keyed by schema name.
    pub fn new(schemas: Vec<DatasetSchema>) -> Result<Self> {
        let mut tabs = BTreeMap::new();
        for schema in schemas {
            let name = schema.name.clone();
            let tab = DatasetTab {
                pipeline: ClaimsPipeline::new(schema)?,
                table: None,
                selection: None,
            };
            if tabs.insert(name.clone(), tab).is_some() {
                return Err(ClaimsError::InvalidSchema(format!(
                    "Duplicate dataset schema '{}'",
                    name
                )));
            }
        }

        let id = Uuid::new_v4();
        info!("Session {} opened with tabs {:?}", id, tabs.keys().collect::<Vec<_>>());
        Ok(Self { id, user: None, tabs })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn tab_names(&self) -> Vec<&str> {
        self.tabs.keys().map(|k| k.as_str()).collect()
    }

    pub fn authenticate(
        &mut self,
        verifier: &dyn CredentialVerifier,
        username: &str,
        secret: &str,
    ) -> Result<()> {
        if verifier.verify(username, secret) {
            info!("Session {}: user '{}' authenticated", self.id, username);
            self.user = Some(username.to_string());
            Ok(())
        } else {
            warn!("Session {}: rejected credentials for '{}'", self.id, username);
            self.user = None;
            Err(ClaimsError::Unauthorized(format!(
                "Invalid credentials for '{}'",
                username
            )))
        }
    }

    /// Forget the user and every upload.
    pub fn logout(&mut self) {
        info!("Session {}: logged out", self.id);
        self.user = None;
        for tab in self.tabs.values_mut() {
            tab.table = None;
            tab.selection = None;
        }
    }

    fn require_user(&self) -> Result<()> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(ClaimsError::Unauthorized("Login required".to_string()))
        }
    }

    pub fn tab(&self, name: &str) -> Result<&DatasetTab> {
        self.tabs
            .get(name)
            .ok_or_else(|| ClaimsError::InvalidSelection(format!("Unknown dataset tab '{}'", name)))
    }

    fn tab_mut(&mut self, name: &str) -> Result<&mut DatasetTab> {
        self.tabs
            .get_mut(name)
            .ok_or_else(|| ClaimsError::InvalidSelection(format!("Unknown dataset tab '{}'", name)))
    }

    /// Upload a CSV or workbook file to a tab.
    pub fn upload_file(&mut self, tab: &str, path: impl AsRef<Path>) -> Result<()> {
        self.require_user()?;
        let entry = self.tab_mut(tab)?;
        let loaded = entry.pipeline.load_file(path);
        Self::replace_table(entry, loaded)
    }

    pub fn upload_frame(&mut self, tab: &str, raw: &DataFrame) -> Result<()> {
        self.require_user()?;
        let entry = self.tab_mut(tab)?;
        let loaded = entry.pipeline.load_frame(raw);
        Self::replace_table(entry, loaded)
    }

    /// A new upload replaces the old one; a failed upload leaves the tab empty
    /// so results from the previous file are never shown for the new one.
    fn replace_table(entry: &mut DatasetTab, loaded: Result<ClaimsTable>) -> Result<()> {
        entry.table = None;
        entry.selection = None;
        let table = loaded?;

        // Default to the first year, as the year control lists them ascending.
        entry.selection = available_years(&table)?
            .first()
            .map(|year| AnalysisSelection::new(*year));
        entry.table = Some(table);
        Ok(())
    }

    fn loaded_table(&self, tab: &str) -> Result<&ClaimsTable> {
        self.tab(tab)?.table.as_ref().ok_or_else(|| {
            ClaimsError::UnusableInput(format!("No file uploaded for dataset '{}'", tab))
        })
    }

    pub fn years(&self, tab: &str) -> Result<Vec<i32>> {
        self.require_user()?;
        available_years(self.loaded_table(tab)?)
    }

    pub fn products(&self, tab: &str) -> Result<Vec<String>> {
        self.require_user()?;
        available_products(self.loaded_table(tab)?)
    }

    /// Store new filter controls for a tab after validating them.
    pub fn select(&mut self, tab: &str, selection: AnalysisSelection) -> Result<()> {
        self.require_user()?;
        let table = self.loaded_table(tab)?;
        selection.validate(&available_years(table)?, &available_products(table)?)?;
        self.tab_mut(tab)?.selection = Some(selection);
        Ok(())
    }

    /// Re-run the whole pipeline for a tab with its current selection.
    pub fn render(&self, tab: &str, reference_time: NaiveDateTime) -> Result<DashboardOutput> {
        self.require_user()?;
        let entry = self.tab(tab)?;
        let table = self.loaded_table(tab)?;
        let selection = entry.selection.as_ref().ok_or_else(|| {
            ClaimsError::UnusableInput(format!(
                "No incident date in dataset '{}' could be parsed",
                tab
            ))
        })?;
        entry.pipeline.run(table, selection, reference_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{CredentialEntry, StaticCredentials};
    use polars::prelude::*;

    fn credentials() -> StaticCredentials {
        StaticCredentials::new(&[CredentialEntry {
            username: "ana".to_string(),
            password: "clave".to_string(),
        }])
    }

    fn upload() -> DataFrame {
        df![
            "FECHA SINIESTRO" => ["2022-05-01", "2023-05-01"],
            "ESTADO" => ["LIQUIDADO", "PENDIENTE"]
        ]
        .unwrap()
    }

    fn now() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_render_requires_login() {
        let mut session = Session::new(vec![DatasetSchema::life()]).unwrap();
        assert!(matches!(
            session.upload_frame("life", &upload()),
            Err(ClaimsError::Unauthorized(_))
        ));
        assert!(session.authenticate(&credentials(), "ana", "wrong").is_err());
        assert!(!session.is_authenticated());
        assert!(matches!(session.render("life", now()), Err(ClaimsError::Unauthorized(_))));
    }

    #[test]
    fn test_upload_defaults_to_first_year() {
        let mut session = Session::new(vec![DatasetSchema::life()]).unwrap();
        session.authenticate(&credentials(), "ana", "clave").unwrap();
        session.upload_frame("life", &upload()).unwrap();
        assert_eq!(session.years("life").unwrap(), vec![2022, 2023]);
        assert_eq!(session.tab("life").unwrap().selection().unwrap().year, 2022);

        let output = session.render("life", now()).unwrap();
        assert_eq!(output.report.raw_rows, 1);
    }

    #[test]
    fn test_select_rejects_unknown_year() {
        let mut session = Session::new(vec![DatasetSchema::life()]).unwrap();
        session.authenticate(&credentials(), "ana", "clave").unwrap();
        session.upload_frame("life", &upload()).unwrap();
        assert!(session.select("life", AnalysisSelection::new(2019)).is_err());
        session.select("life", AnalysisSelection::new(2023)).unwrap();
        assert_eq!(session.render("life", now()).unwrap().report.selection.year, 2023);
    }

    #[test]
    fn test_failed_upload_clears_tab() {
        let mut session = Session::new(vec![DatasetSchema::life()]).unwrap();
        session.authenticate(&credentials(), "ana", "clave").unwrap();
        session.upload_frame("life", &upload()).unwrap();

        let broken = upload().drop("ESTADO").unwrap();
        assert!(session.upload_frame("life", &broken).is_err());
        assert!(session.tab("life").unwrap().table().is_none());
        assert!(session.render("life", now()).unwrap_err().is_unusable_input());
    }

    #[test]
    fn test_tabs_are_independent() {
        let mut session = Session::new(vec![DatasetSchema::life(), DatasetSchema::property()]).unwrap();
        session.authenticate(&credentials(), "ana", "clave").unwrap();
        session.upload_frame("life", &upload()).unwrap();
        assert!(session.tab("property").unwrap().table().is_none());
        assert_eq!(session.tab_names(), vec!["life", "property"]);
    }

    #[test]
    fn test_duplicate_schema_names_rejected() {
        assert!(Session::new(vec![DatasetSchema::life(), DatasetSchema::life()]).is_err());
    }

    #[test]
    fn test_logout_drops_uploads() {
        let mut session = Session::new(vec![DatasetSchema::life()]).unwrap();
        session.authenticate(&credentials(), "ana", "clave").unwrap();
        session.upload_frame("life", &upload()).unwrap();
        session.logout();
        assert!(session.tab("life").unwrap().table().is_none());
        assert!(session.user().is_none());
    }
}
