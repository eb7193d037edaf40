pub mod api;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod model;
pub mod picker;
pub mod sync;

use anyhow::{Context, Result};

use crate::api::{ApiClient, HttpTransport};
use crate::cli::Cli;
use crate::config::Config;
use crate::model::{Course, TreeModel};
use crate::picker::CourseChoice;
use crate::sync::SyncEngine;

/// Wire configuration, credentials and client together and run the
/// requested mode: password reset, course selection, or sync pass(es).
pub fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let mut config = Config::load(&config_path)?;

    if cli.password {
        return credentials::reset_password(&config.settings.username);
    }

    let creds = credentials::resolve(&config.settings)?;
    let transport = HttpTransport::new(&config.settings.base_address, creds)?;
    let client = ApiClient::new(transport);
    client
        .check_auth()
        .context("could not authenticate against the Stud.IP API")?;

    if cli.configure {
        return configure_selection(&client, &mut config);
    }

    let overwrite = cli.force || config.settings.overwrite;
    let mut engine = SyncEngine::new(&client, &mut config).with_overwrite(overwrite);

    let cancel = engine.cancellation_handle();
    ctrlc::set_handler(move || {
        tracing::warn!("termination signal received, finishing up");
        cancel.store(true, std::sync::atomic::Ordering::SeqCst);
    })
    .context("failed to install the signal handler")?;

    engine.run(cli.daemon)?;
    Ok(())
}

/// List all subscribed courses with their frozen titles and open the
/// picker; a confirmed selection is persisted immediately.
fn configure_selection<T: api::Transport>(
    client: &ApiClient<T>,
    config: &mut Config,
) -> Result<()> {
    let portable = config.settings.portable_names;
    let descriptors = client.list_courses()?;

    let mut choices = Vec::with_capacity(descriptors.len());
    {
        let mut tree = TreeModel::new(client, config);
        for descriptor in descriptors {
            let course = Course::from(descriptor);
            let title = match tree.course_title(&course) {
                Ok(title) => title,
                Err(err) => {
                    tracing::warn!(course = %course.remote_title, error = %err, "using remote title");
                    model::sanitize(&course.remote_title, portable)
                }
            };
            choices.push(CourseChoice {
                id: course.id,
                title,
            });
        }
    }

    match picker::select_courses(&choices, &config.settings.selected_courses)? {
        Some(ids) => {
            config.settings.selected_courses = ids;
            config.save()?;
            tracing::info!("course selection updated");
        }
        None => tracing::info!("selection aborted, keeping previous courses"),
    }
    Ok(())
}
