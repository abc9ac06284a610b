extern crate clap;
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use once_cell::sync::OnceCell;
use tonic::transport::Channel;

use jobdash::config::Config;
use jobdash::proto::job_dashboard_client::JobDashboardClient;
use jobdash::proto::{ApiRequest, CreateJobRequest, Job, JobIdsRequest, OverviewRow};

static CONFIG: OnceCell<Config> = OnceCell::new();

const ID_COMMANDS: [(&str, &str); 6] = [
    ("run", "Makes unlocked jobs due now"),
    ("requeue", "Queues a fresh copy of each job"),
    ("unlock", "Clears the lock of jobs stuck as running"),
    ("enable", "Re-enables disabled jobs"),
    ("disable", "Stops jobs from being picked up"),
    ("delete", "Removes jobs"),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    CONFIG
        .set(Config::load()?)
        .map_err(|_| anyhow::anyhow!("configuration already loaded"))?;

    let mut app = App::new("jobdash-client")
        .version("0.1.0")
        .about("Inspects and controls jobs through a jobdash server")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("address")
                .short("a")
                .long("address")
                .value_name("URL")
                .help("Server to talk to, defaults to the configured server address")
                .takes_value(true),
        )
        .subcommand(
            SubCommand::with_name("list")
                .about("Shows the overview and the matching jobs")
                .arg(
                    Arg::with_name("name")
                        .short("n")
                        .long("name")
                        .takes_value(true)
                        .help("Only list jobs with this name"),
                )
                .arg(
                    Arg::with_name("state")
                        .short("s")
                        .long("state")
                        .takes_value(true)
                        .possible_values(&[
                            "running",
                            "scheduled",
                            "queued",
                            "completed",
                            "failed",
                            "repeating",
                            "disabled",
                        ])
                        .help("Only list jobs in this state"),
                ),
        )
        .subcommand(
            SubCommand::with_name("create")
                .about("Creates a job")
                .arg(
                    Arg::with_name("name")
                        .short("n")
                        .long("name")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("schedule")
                        .short("s")
                        .long("schedule")
                        .value_name("WHEN")
                        .takes_value(true)
                        .help("One-off run time: now, RFC 3339, or \"in 10 minutes\""),
                )
                .arg(
                    Arg::with_name("every")
                        .short("e")
                        .long("every")
                        .value_name("INTERVAL")
                        .takes_value(true)
                        .help("Repeat interval: \"5 minutes\" or a cron expression"),
                )
                .arg(
                    Arg::with_name("data")
                        .short("d")
                        .long("data")
                        .value_name("JSON")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("timezone")
                        .short("z")
                        .long("timezone")
                        .takes_value(true),
                ),
        );

    for &(name, about) in ID_COMMANDS.iter() {
        app = app.subcommand(
            SubCommand::with_name(name).about(about).arg(
                Arg::with_name("ids")
                    .value_name("JOB_ID")
                    .multiple(true)
                    .required(true),
            ),
        );
    }

    let matches = app.get_matches();
    let mut client = JobDashboardClient::connect(address(&matches)?).await?;

    match matches.subcommand() {
        ("list", Some(args)) => list(&mut client, args).await,
        ("create", Some(args)) => create(&mut client, args).await,
        (command, Some(args)) => control(&mut client, command, args).await,
        _ => Ok(()),
    }
}

fn address(matches: &ArgMatches) -> anyhow::Result<String> {
    if let Some(address) = matches.value_of("address") {
        return Ok(address.to_owned());
    }
    let config = CONFIG
        .get()
        .ok_or_else(|| anyhow::anyhow!("Could not get a config object"))?;
    Ok(format!("http://{}", config.address()))
}

fn failure(status: tonic::Status) -> anyhow::Error {
    anyhow::anyhow!("{}", status.message())
}

async fn list(client: &mut JobDashboardClient<Channel>, args: &ArgMatches<'_>) -> anyhow::Result<()> {
    let request = ApiRequest {
        job: args.value_of("name").unwrap_or_default().into(),
        state: args.value_of("state").unwrap_or_default().into(),
    };
    let response = client.api(request).await.map_err(failure)?.into_inner();

    println!("{}", response.title);
    println!(
        "{:<30} {:>6} {:>8} {:>9} {:>7} {:>9} {:>7} {:>9} {:>8}",
        "NAME", "TOTAL", "RUNNING", "SCHEDULED", "QUEUED", "COMPLETED", "FAILED", "REPEATING", "DISABLED"
    );
    for row in &response.overview {
        print_row(row);
    }

    if let Some(current) = &response.current_request {
        println!();
        match current.state.as_str() {
            "" => println!("{} ({} listed)", current.job, response.jobs.len()),
            state => println!("{}, {} ({} listed)", current.job, state, response.jobs.len()),
        }
    }
    for job in &response.jobs {
        print_job(job);
    }
    Ok(())
}

fn print_row(row: &OverviewRow) {
    println!(
        "{:<30} {:>6} {:>8} {:>9} {:>7} {:>9} {:>7} {:>9} {:>8}",
        row.display_name,
        row.total,
        row.running,
        row.scheduled,
        row.queued,
        row.completed,
        row.failed,
        row.repeating,
        row.disabled
    );
}

fn print_job(job: &Job) {
    let flags: Vec<&str> = job
        .status
        .as_ref()
        .map(|status| {
            [
                (status.running, "running"),
                (status.scheduled, "scheduled"),
                (status.queued, "queued"),
                (status.completed, "completed"),
                (status.failed, "failed"),
                (status.repeating, "repeating"),
                (status.disabled, "disabled"),
            ]
            .iter()
            .filter(|(set, _)| *set)
            .map(|(_, name)| *name)
            .collect()
        })
        .unwrap_or_default();

    println!(
        "{} {:<30} next={} last_run={} last_finished={} [{}]",
        job.id,
        job.name,
        or_dash(&job.next_run_at),
        or_dash(&job.last_run_at),
        or_dash(&job.last_finished_at),
        flags.join(",")
    );
    if !job.fail_reason.is_empty() {
        println!("    failed: {}", job.fail_reason);
    }
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

async fn create(client: &mut JobDashboardClient<Channel>, args: &ArgMatches<'_>) -> anyhow::Result<()> {
    let request = CreateJobRequest {
        name: args.value_of("name").unwrap_or_default().into(),
        schedule: args.value_of("schedule").unwrap_or_default().into(),
        repeat_every: args.value_of("every").unwrap_or_default().into(),
        data: args.value_of("data").unwrap_or_default().into(),
        repeat_timezone: args.value_of("timezone").unwrap_or_default().into(),
    };
    let response = client.create_job(request).await.map_err(failure)?.into_inner();
    if let Some(job) = response.job {
        print_job(&job);
    }
    Ok(())
}

async fn control(
    client: &mut JobDashboardClient<Channel>,
    command: &str,
    args: &ArgMatches<'_>,
) -> anyhow::Result<()> {
    let job_ids: Vec<String> = args
        .values_of("ids")
        .map(|ids| ids.map(String::from).collect())
        .unwrap_or_default();
    let request = JobIdsRequest { job_ids };

    let modified = match command {
        "run" => client.run_jobs(request).await,
        "unlock" => client.unlock_jobs(request).await,
        "enable" => client.enable_jobs(request).await,
        "disable" => client.disable_jobs(request).await,
        "requeue" => {
            let response = client.requeue_jobs(request).await.map_err(failure)?.into_inner();
            println!("Requeued {} jobs", response.jobs.len());
            for job in &response.jobs {
                print_job(job);
            }
            return Ok(());
        }
        "delete" => {
            client.delete_jobs(request).await.map_err(failure)?;
            println!("Deleted jobs");
            return Ok(());
        }
        other => return Err(anyhow::anyhow!("unknown command {}", other)),
    };

    let modified = modified.map_err(failure)?.into_inner().modified;
    println!("Updated {} jobs", modified);
    Ok(())
}
