mod commands;
mod util;

use bridgewatch_runtime::MutationEntity;
use clap::{Parser, Subcommand};

use commands::action::{ActionCommands, ActionsCommands};
use commands::auth::AuthCommands;
use commands::mutation::MutationCommands;
use commands::recurrence::RecurrenceCommands;
use commands::situation::SituationCommands;
use util::{GlobalArgs, exit_error};

#[derive(Parser)]
#[command(name = "bridgewatch", version, about = "Bridgewatch CLI: role-gated yacht operations actions and situation tooling")]
struct Cli {
    /// API base URL
    #[arg(long, env = "BRIDGEWATCH_API_URL", default_value = "http://localhost:3000", global = true)]
    api_url: String,

    /// Yacht the session acts on
    #[arg(long, env = "BRIDGEWATCH_YACHT_ID", global = true)]
    yacht_id: Option<String>,

    /// Acting user
    #[arg(long, env = "BRIDGEWATCH_USER_ID", global = true)]
    user_id: Option<String>,

    /// Crew role, e.g. "engineer" or "chief_officer"
    #[arg(long, env = "BRIDGEWATCH_ROLE", global = true)]
    role: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check API health
    Health,
    /// Browse the action registry
    Actions {
        #[command(subcommand)]
        command: ActionsCommands,
    },
    /// Execute registry actions
    Action {
        #[command(subcommand)]
        command: ActionCommands,
    },
    /// Two-phase work order creation
    WorkOrder {
        #[command(subcommand)]
        command: MutationCommands,
    },
    /// Two-phase fault reporting
    Fault {
        #[command(subcommand)]
        command: MutationCommands,
    },
    /// Symptom recurrence checks
    Recurrence {
        #[command(subcommand)]
        command: RecurrenceCommands,
    },
    /// Offline situation tooling
    Situation {
        #[command(subcommand)]
        command: SituationCommands,
    },
    /// Manage stored credentials
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Print the OpenAPI components for all wire types
    Schema,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    util::init_tracing();
    let cli = Cli::parse();

    let global = GlobalArgs {
        api_url: cli.api_url,
        yacht_id: cli.yacht_id,
        user_id: cli.user_id,
        role: cli.role,
    };

    let result = match cli.command {
        Commands::Health => commands::health::run(&global.api_url).await,
        Commands::Actions { command } => match command {
            ActionsCommands::List {
                domain,
                capabilities,
            } => commands::action::list(&global, domain.as_deref(), capabilities),
            ActionsCommands::Describe { name } => commands::action::describe(&name),
        },
        Commands::Action { command } => commands::action::run(&global, command).await,
        Commands::WorkOrder { command } => {
            commands::mutation::run(&global, MutationEntity::WorkOrder, command).await
        }
        Commands::Fault { command } => {
            commands::mutation::run(&global, MutationEntity::Fault, command).await
        }
        Commands::Recurrence { command } => commands::recurrence::run(&global, command).await,
        Commands::Situation { command } => commands::situation::run(&global, command),
        Commands::Auth { command } => commands::auth::run(&global.api_url, command),
        Commands::Schema => util::print_json(&bridgewatch_core::schema::document()),
    };

    if let Err(e) = result {
        exit_error(&e.to_string(), None);
    }
}
