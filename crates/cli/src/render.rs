// Terminal rendering for jobs (tables, details, live view)

use chrono::Local;
use colored::{ColoredString, Colorize};
use noxtools_core::application::ViewState;
use noxtools_core::domain::{Job, JobStatus, Timestamp, ToolResult};
use noxtools_infra_http::HttpJobTransport;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct JobRow {
    id: String,
    tool: String,
    status: String,
    input: String,
    created: String,
    attempt: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            tool: job.tool.to_string(),
            status: job.status.to_string(),
            input: job
                .input_filename
                .clone()
                .unwrap_or_else(|| "-".to_string()),
            created: format_time(&job.created_at),
            attempt: format!("{}/{}", job.attempt.max(1), job.max_attempts.max(1)),
        }
    }
}

pub fn job_table(jobs: &[Job]) -> String {
    Table::new(jobs.iter().map(JobRow::from)).to_string()
}

pub fn format_time(ts: &Timestamp) -> String {
    ts.as_datetime()
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

pub fn status_label(status: JobStatus) -> ColoredString {
    match status {
        JobStatus::Pending => status.as_str().yellow(),
        JobStatus::Running => status.as_str().cyan(),
        JobStatus::Done => status.as_str().green(),
        JobStatus::Error => status.as_str().red(),
        JobStatus::Aborted => status.as_str().magenta(),
    }
}

pub fn print_job(job: &Job, transport: &HttpJobTransport) {
    println!("{}", format!("Job {}", job.id).cyan().bold());
    println!();
    println!("  {} {}", "Tool:".bold(), job.tool);
    println!("  {} {}", "Status:".bold(), status_label(job.status));
    if let Some(input) = &job.input_filename {
        println!("  {} {}", "Input:".bold(), input);
    }
    println!("  {} {}", "Created:".bold(), format_time(&job.created_at));
    if let Some(started) = &job.started_at {
        println!("  {} {}", "Started:".bold(), format_time(started));
    }
    if let Some(completed) = &job.completed_at {
        println!("  {} {}", "Completed:".bold(), format_time(completed));
    }
    println!("  {} {}/{}", "Attempt:".bold(), job.attempt.max(1), job.max_attempts.max(1));
    if let Some(message) = &job.error_message {
        println!("  {} {}", "Error:".bold(), message.red());
    }

    match job.typed_result() {
        Ok(result) => print_result(&result),
        Err(e) => println!("  {} {}", "Result:".bold(), e.to_string().yellow()),
    }

    let mut files = job.output_files.clone();
    if let Ok(result) = job.typed_result() {
        for file in result.files() {
            if !files.contains(&file) {
                files.push(file);
            }
        }
    }
    if job.status == JobStatus::Done && !files.is_empty() {
        println!();
        println!("  {}", "Downloads:".bold());
        for file in &files {
            match transport.download_url(job.tool, &job.id, file) {
                Ok(url) => println!("    {} {}", "•".bold(), url),
                Err(e) => println!("    {} {}: {}", "✗".red(), file, e),
            }
        }
    }
    if let Ok(Some(url)) = transport.source_url(job.tool, &job.id) {
        println!("  {} {}", "Source:".bold(), url);
    }
}

fn print_result(result: &ToolResult) {
    match result {
        ToolResult::Noxsongizer(stems) if !stems.stems.is_empty() => {
            println!("  {} {}", "Stems:".bold(), stems.stems.join(", "));
        }
        ToolResult::Noxelizer(video) => {
            if let Some(file) = &video.video {
                println!("  {} {}", "Video:".bold(), file);
            }
            if let (Some(frames), Some(fps)) = (video.frames_written, video.fps) {
                println!("  {} {} @ {:.1} fps", "Frames:".bold(), frames, fps);
            }
        }
        ToolResult::Noxtubizer(youtube) => {
            if let Some(title) = youtube.source_title.as_ref().or(youtube.safe_title.as_ref()) {
                println!("  {} {}", "Title:".bold(), title);
            }
            if let Some(url) = &youtube.url {
                println!("  {} {}", "URL:".bold(), url);
            }
        }
        ToolResult::Noxtunizer(analysis) => {
            if let Some(bpm) = analysis.bpm {
                println!("  {} {:.1}", "BPM:".bold(), bpm);
            }
            if let Some(key) = &analysis.key {
                println!("  {} {}", "Key:".bold(), key);
            }
            if !analysis.duration_label.is_empty() {
                println!("  {} {}", "Duration:".bold(), analysis.duration_label);
            }
        }
        _ => {}
    }
}

/// Full-screen redraw of a live view
pub fn print_view(title: &str, state: &ViewState) {
    // Clear screen, cursor home
    print!("\x1B[2J\x1B[H");
    println!("{}", title.cyan().bold());
    println!();

    if let Some(error) = &state.error {
        println!("{}", error.red().bold());
        println!();
    }

    if state.jobs.is_empty() {
        if state.loading {
            println!("{}", "Loading jobs...".yellow());
        } else {
            println!("{}", "No jobs yet".yellow());
        }
    } else {
        println!("{}", job_table(&state.paged_items));
    }

    println!();
    println!(
        "Page {}/{} · {} jobs{}",
        state.page,
        state.total_pages,
        state.total,
        if state.loading { " · refreshing" } else { "" }
    );
    println!("{}", "Ctrl+C to quit".dimmed());
}

#[cfg(test)]
mod tests {
    use super::*;
    use noxtools_core::domain::JobTool;

    #[test]
    fn test_job_row() {
        let mut job = Job::new("abc", JobTool::Noxtubizer, Timestamp::from_millis(0).unwrap());
        job.status = JobStatus::Running;
        let row = JobRow::from(&job);
        assert_eq!(row.id, "abc");
        assert_eq!(row.tool, "noxtubizer");
        assert_eq!(row.status, "running");
        assert_eq!(row.input, "-");
        assert_eq!(row.attempt, "1/1");
    }

    #[test]
    fn test_job_table_lists_every_job() {
        let jobs = vec![
            Job::new("first", JobTool::Noxelizer, Timestamp::from_millis(0).unwrap()),
            Job::new("second", JobTool::Noxtunizer, Timestamp::from_millis(0).unwrap()),
        ];
        let table = job_table(&jobs);
        assert!(table.contains("first"));
        assert!(table.contains("second"));
        assert!(table.contains("status"));
    }
}
