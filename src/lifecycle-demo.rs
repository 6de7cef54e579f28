//! A demonstration binary driving one full election lifecycle against the
//! in-process simulation: create, register, cast, and reveal.

use clap::{Arg, ArgAction, ArgMatches, Command};
use log::LevelFilter;

use csvp_client::model::account::AccountId;
use csvp_client::model::voter::voter_hash;
use csvp_client::sim::Simulation;
use csvp_client::{Config, Error};

const PROGRAM_NAME: &str = "lifecycle-demo";

const ABOUT_TEXT: &str = "Run one confidential election end to end against \
an in-process ledger and MXE simulator.";

const CANDIDATE: &str = "CANDIDATE";

const CANDIDATE_HELP: &str = "The candidate index (0-4) the demo voter casts a ballot for";

const VERBOSE: &str = "verbose";

/// Construct the CLI configuration.
fn cli() -> Command {
    clap::command!(PROGRAM_NAME).about(ABOUT_TEXT).args([
        Arg::new(CANDIDATE)
            .help(CANDIDATE_HELP)
            .value_parser(clap::value_parser!(usize))
            .action(ArgAction::Set)
            .required(true),
        Arg::new(VERBOSE)
            .short('v')
            .long(VERBOSE)
            .help("Log every protocol step")
            .action(ArgAction::SetTrue),
    ])
}

async fn run(args: &ArgMatches) -> Result<(), Error> {
    let candidate: usize = *args.get_one(CANDIDATE).unwrap(); // Required argument is guaranteed to be present.

    let sim = Simulation::new();
    let client = sim.client(Config::load()?);
    let creator = AccountId(rand::random());

    client.init_comp_defs(&creator).await?;
    let now = chrono::Utc::now();
    let election = client
        .create_election(
            &creator,
            1,
            "Galactic President Election",
            now - chrono::Duration::seconds(60),
            now + chrono::Duration::seconds(3600),
        )
        .await?;
    println!("Election created: {election}");

    let voter = voter_hash(b"demo voter", b"demo salt");
    client.register_voter(voter).await?;
    println!("Voter registered: {voter}");

    let receipt = client.cast_vote(voter, election, candidate).await?;
    println!("Ballot cast, receipt: {}", receipt.receipt_id);

    let verified = client.verify_receipt(election, receipt.receipt_id).await?;
    println!("Receipt verifies: {verified}");

    // The simulation lets us skip to the end of the voting window.
    sim.close_voting(&election);
    let result = client.reveal_result(&creator, election).await?;
    println!("Final result:");
    for (index, count) in result.iter().enumerate() {
        println!(
            "  candidate {index}: {count} vote{}",
            if *count != 1 { "s" } else { "" }
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = cli().get_matches();
    let level = if args.get_flag(VERBOSE) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    csvp_client::logging::init(level).expect("Failed to initialise logging");

    if let Err(err) = run(&args).await {
        eprintln!("Demo failed: {err}");
        if err.is_retryable() {
            eprintln!("This failure is transient; re-running may succeed.");
        }
        std::process::exit(1)
    }
}
