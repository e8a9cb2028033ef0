use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use kanban_order::models::{ColumnKey, NewTask, UNASSIGNED_COLUMN_ID};
use kanban_order::{
    BoardOrder, Config, DragEvent, DragLocation, HttpTaskApi, TaskApi, TaskOrderManager,
};

/// Reorders, creates and deletes kanban tasks through a remote Task API.
#[derive(Debug, Parser)]
#[command(name = "kanban-order", version)]
struct Cli {
    /// Base URL of the Task API (overrides KANBAN_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every column of a board in order
    Show { board: Uuid },
    /// Move a task as a drag-and-drop would
    Move {
        board: Uuid,
        from_column: ColumnKey,
        from_index: usize,
        to_column: ColumnKey,
        to_index: usize,
    },
    /// Append a task to a column
    Create {
        board: Uuid,
        title: String,
        #[arg(long, default_value = UNASSIGNED_COLUMN_ID)]
        column: ColumnKey,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a task and close the gap in its column
    Delete { board: Uuid, task: Uuid },
    /// Verify that every column forms a single chain
    Check { board: Uuid },
    /// Rewrite broken chains
    Repair { board: Uuid },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kanban_order=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(url) = cli.api_url {
        config.api_url = url.trim_end_matches('/').to_string();
    }

    let api = Arc::new(HttpTaskApi::from_config(&config)?);
    let manager = TaskOrderManager::new(api, &config);

    match cli.command {
        Command::Show { board } => {
            let order = manager.load(board).await?;
            print_board(&manager, &order).await?;
        }
        Command::Move {
            board,
            from_column,
            from_index,
            to_column,
            to_index,
        } => {
            manager.load(board).await?;
            let drag = DragEvent::new(
                DragLocation::new(from_column, from_index),
                DragLocation::new(to_column, to_index),
            );
            let order = manager.move_task(board, drag).await?;
            print_board(&manager, &order).await?;
        }
        Command::Create {
            board,
            title,
            column,
            description,
        } => {
            let task = manager
                .create_task(
                    board,
                    NewTask {
                        title,
                        description,
                        column,
                    },
                )
                .await?;
            println!("{}", task.id);
        }
        Command::Delete { board, task } => {
            let order = manager.delete_task(board, task).await?;
            print_board(&manager, &order).await?;
        }
        Command::Check { board } => {
            let order = manager.load(board).await?;
            let mut broken = 0;
            for column in order.columns() {
                match column.verify() {
                    Ok(()) => println!("{}: ok ({} tasks)", column.key(), column.len()),
                    Err(e) => {
                        broken += 1;
                        println!("{}: {}", column.key(), e);
                    }
                }
            }
            if broken > 0 {
                anyhow::bail!("{} column(s) with a broken chain", broken);
            }
        }
        Command::Repair { board } => {
            manager.load(board).await?;
            let order = manager.repair(board).await?;
            print_board(&manager, &order).await?;
        }
    }

    Ok(())
}

async fn print_board<A: TaskApi>(
    manager: &TaskOrderManager<A>,
    order: &BoardOrder,
) -> anyhow::Result<()> {
    let board = manager.api().get_board(order.board_id()).await?;
    println!("{}", board.title);
    for group in order.grouped(&board) {
        println!("== {} [{}]", group.name, group.column_id);
        for item in group.items {
            println!("  {:>3}  {}  {}", item.position, item.task.id, item.task.title);
        }
    }
    Ok(())
}
