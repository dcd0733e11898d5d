//! SQL dialect fragments
//!
//! The generic [`SqlBackend`](super::sql::SqlBackend) builds every query
//! itself and asks the dialect only for the pieces that differ between
//! engines. All fragments that read dates and times back render them as
//! text (`YYYY-MM-DD`, `HH:MM`) so the template decodes one row shape on
//! every engine.

/// Engine-specific SQL fragments
pub trait Dialect: Send + Sync + 'static {
    /// Short engine name for logs and health reports
    fn name(&self) -> &'static str;

    /// Bind placeholder for the `index`-th parameter (1-based)
    fn placeholder(&self, index: usize) -> String;

    /// Column type of the stored value
    fn value_type(&self) -> &'static str;

    /// Convert a bound `YYYY-MM-DD` parameter into a date
    fn date_param(&self, placeholder: &str) -> String;

    /// Convert a bound `HH:MM:SS` parameter into a time
    fn time_param(&self, placeholder: &str) -> String;

    /// Render a date expression as `YYYY-MM-DD`
    fn date_text(&self, expr: &str) -> String;

    /// Render a time expression as `HH:MM`
    fn time_text(&self, expr: &str) -> String;

    /// Render a time expression truncated to the hour as `HH:00`
    fn hour_bucket(&self, expr: &str) -> String;

    /// Render the first day of a date's month as `YYYY-MM-01`
    fn month_start(&self, expr: &str) -> String;

    /// Clause appended to a multi-row INSERT to turn it into an upsert on
    /// the four key columns
    fn upsert_clause(&self) -> &'static str;
}
