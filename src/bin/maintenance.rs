use std::env;
use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use diesel::dsl::{exists, not};
use diesel::prelude::*;
use uuid::Uuid;

use taskboard::{
    config::AppConfig,
    db,
    models::{CT_ACTIVITY, CT_SINGLE_USE_CODE},
    schema::{activities, notifications, single_use_codes},
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("cleanup-notifications") => {
            let force = args.iter().any(|arg| arg == "--force");
            cleanup_notifications(force)?;
        }
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\nUsage: maintenance cleanup-notifications [--force]");
            std::process::exit(1);
        }
        None => {
            eprintln!("Usage: maintenance cleanup-notifications [--force]");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Removes notifications whose polymorphic subject no longer resolves:
/// either an unknown subject type, or a subject row that has been deleted.
fn cleanup_notifications(force: bool) -> Result<()> {
    let config = AppConfig::from_env()?;
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let total: i64 = notifications::table.count().get_result(&mut conn)?;

    let invalid_type_ids: Vec<Uuid> = notifications::table
        .filter(notifications::content_type.ne_all(vec![CT_ACTIVITY, CT_SINGLE_USE_CODE]))
        .select(notifications::id)
        .load(&mut conn)?;

    let missing_activity_ids: Vec<Uuid> = notifications::table
        .filter(notifications::content_type.eq(CT_ACTIVITY))
        .filter(not(exists(
            activities::table.filter(activities::id.eq(notifications::object_id)),
        )))
        .select(notifications::id)
        .load(&mut conn)?;

    let missing_code_ids: Vec<Uuid> = notifications::table
        .filter(notifications::content_type.eq(CT_SINGLE_USE_CODE))
        .filter(not(exists(
            single_use_codes::table.filter(single_use_codes::id.eq(notifications::object_id)),
        )))
        .select(notifications::id)
        .load(&mut conn)?;

    let invalid_type_count = invalid_type_ids.len();
    let missing_object_count = missing_activity_ids.len() + missing_code_ids.len();
    let total_invalid = invalid_type_count + missing_object_count;

    if total_invalid == 0 {
        println!("No invalid notifications found.");
        return Ok(());
    }

    println!(
        "\nFound {total_invalid} invalid notifications out of {total} total:\n \
         - {invalid_type_count} notifications with invalid content types\n \
         - {missing_object_count} notifications with missing objects"
    );

    if !force && !confirm("\nDo you want to proceed with deletion? [y/N]: ")? {
        println!("Operation cancelled.");
        return Ok(());
    }

    let mut doomed = invalid_type_ids;
    doomed.extend(missing_activity_ids);
    doomed.extend(missing_code_ids);

    let deleted = diesel::delete(notifications::table.filter(notifications::id.eq_any(&doomed)))
        .execute(&mut conn)
        .context("failed to delete invalid notifications")?;

    println!("\nSuccessfully cleaned up {deleted} notifications.");
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}
