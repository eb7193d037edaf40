//! Interactive course selection.
//!
//! A multi-select prompt over all courses the account is subscribed to,
//! pre-checked with the current selection. The sync core only ever reads
//! the resulting id list from the config; it never opens prompts itself.

use anyhow::{Context, Result};
use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::MultiSelect;

/// One selectable course, with its frozen (or sanitized) display title.
#[derive(Debug, Clone)]
pub struct CourseChoice {
    pub id: String,
    pub title: String,
}

/// Which entries start out checked: those whose id or title is already in
/// the selection.
pub fn preselect(choices: &[CourseChoice], selected: &[String]) -> Vec<bool> {
    choices
        .iter()
        .map(|choice| {
            selected
                .iter()
                .any(|entry| entry == &choice.id || entry == &choice.title)
        })
        .collect()
}

/// Open the picker. Returns the chosen course ids, or `None` when the user
/// aborted (Esc), in which case the existing selection stays untouched.
pub fn select_courses(
    choices: &[CourseChoice],
    selected: &[String],
) -> Result<Option<Vec<String>>> {
    if choices.is_empty() {
        println!("{}", style("No courses found for this account.").yellow());
        return Ok(None);
    }

    let defaults = preselect(choices, selected);
    let items: Vec<&str> = choices.iter().map(|c| c.title.as_str()).collect();

    let picked = MultiSelect::with_theme(&ColorfulTheme::default())
        .with_prompt("Select courses to download")
        .items(&items)
        .defaults(&defaults)
        .interact_opt()
        .context("course picker failed")?;

    Ok(picked.map(|indices| {
        indices
            .into_iter()
            .map(|i| choices[i].id.clone())
            .collect()
    }))
}
