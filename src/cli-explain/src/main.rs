extern crate clap;
extern crate rustyline;
use clap::{App, Arg};
use common::ast::Statement;
use common::catalog::Catalog;
use common::database::Database;
use common::ids::TransactionId;
use common::sql_parser::SQLParser;
use common::{Attribute, CrustyError, TableSchema};
use env_logger::Env;
use log::{debug, error, info};
use optimizer::{PlannerConfig, QueryToOperatorTransformer};
use serde::Deserialize;

use rustyline::error::ReadlineError;
use rustyline::Editor;
use std::fs;
use std::process;

/// Table created before the first statement runs.
#[derive(Deserialize, Debug)]
struct TableConfig {
    name: String,
    columns: Vec<Attribute>,
}

#[derive(Deserialize, Debug)]
struct ExplainConfig {
    database: String,
    #[serde(default)]
    planner: PlannerConfig,
    #[serde(default)]
    tables: Vec<TableConfig>,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        ExplainConfig {
            database: String::from("crustydb"),
            planner: PlannerConfig::default(),
            tables: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum OutputFormat {
    Text,
    Json,
}

/// Catalog and settings shared by every statement of one run.
struct Session {
    db: Database,
    planner: PlannerConfig,
    format: OutputFormat,
    parser: SQLParser,
}

impl Session {
    fn new(config: ExplainConfig, format: OutputFormat) -> Result<Self, CrustyError> {
        let db = Database::new(config.database);
        for table in config.tables {
            db.create_table(&table.name, TableSchema::new(table.columns))?;
        }
        Ok(Session {
            db,
            planner: config.planner,
            format,
            parser: SQLParser::new(),
        })
    }

    /// Handles one command or SQL text. Returns false when the session should end.
    fn process_input(&self, line: &str) -> bool {
        let command = line.trim();
        if command.starts_with('\\') {
            return self.process_command(command);
        }
        match self.explain_sql(command) {
            Ok(outputs) => {
                for output in outputs {
                    println!("{}", output);
                }
            }
            Err(e) => error!("{}", e),
        }
        true
    }

    fn process_command(&self, command: &str) -> bool {
        match command {
            "\\quit" | "\\q" => {
                info!("Received Quit Command");
                false
            }
            "\\dt" => {
                for (name, columns) in self.list_tables() {
                    println!("{} ({})", name, columns.join(", "));
                }
                true
            }
            _ => {
                error!("Unknown command {}", command);
                true
            }
        }
    }

    /// Table names with their columns, sorted by name.
    fn list_tables(&self) -> Vec<(String, Vec<String>)> {
        let tables = self.db.get_tables();
        let mut listing = Vec::new();
        if let Ok(tables) = tables.read() {
            for table in tables.values() {
                if let Ok(table) = table.read() {
                    listing.push((table.name.clone(), table.schema.column_names()));
                }
            }
        }
        listing.sort();
        listing
    }

    /// Parses `sql`, applies its DDL to the catalog, and renders the plan of every statement.
    fn explain_sql(&self, sql: &str) -> Result<Vec<String>, CrustyError> {
        let statements = self.parser.parse(sql)?;
        let mut outputs = Vec::with_capacity(statements.len());
        for statement in statements {
            self.apply_ddl(&statement)?;
            let mut transformer =
                QueryToOperatorTransformer::with_config(&self.db, TransactionId::new(), self.planner);
            match transformer.transform(&statement)? {
                Some(tree) => outputs.push(match self.format {
                    OutputFormat::Text => tree.explain(),
                    OutputFormat::Json => tree.to_json().to_string(),
                }),
                None => debug!("{} statement has no logical plan", statement.kind()),
            }
        }
        Ok(outputs)
    }

    fn apply_ddl(&self, statement: &Statement) -> Result<(), CrustyError> {
        match statement {
            Statement::Create(create) => self
                .db
                .create_table(&create.table.name, TableSchema::new(create.columns.clone())),
            Statement::Drop(drop) => {
                for table in &drop.tables {
                    self.db.drop_table(&table.name, drop.if_exists)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn process_cli_input(session: &Session) {
    let mut rl = Editor::<()>::new();
    if rl.load_history("history.txt").is_err() {
        info!("No previous history.");
    }
    let prompt: &str = "[explain]>>";
    let mut cont = true;
    while cont {
        let readline = rl.readline(prompt);
        match readline {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                rl.add_history_entry(line.as_str());
                cont = session.process_input(line.as_str());
            }
            Err(ReadlineError::Interrupted) => {
                info!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                info!("CTRL-D");
                break;
            }
            Err(err) => {
                error!("Error: {:?}", err);
                break;
            }
        }
    }
    if let Err(e) = rl.save_history("history.txt") {
        error!("Could not save history: {}", e);
    }
}

fn process_script_input(session: &Session, script: &str) {
    for line in script.split(';') {
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        let clean_command = command.replace("\n", " ");
        info!("Script clean command: {}", clean_command);
        if !session.process_input(&clean_command) {
            break;
        }
    }
}

fn read_config(path: &str) -> Result<ExplainConfig, CrustyError> {
    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| CrustyError::CrustyError(format!("Malformatted config {}: {}", path, e)))
}

fn main() {
    // Configure log environment
    env_logger::from_env(Env::default().default_filter_or("info")).init();

    let matches = App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("Sets a custom config file")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("script")
                .short("s")
                .long("script")
                .value_name("SQL_SCRIPT")
                .help("Takes in a semicolon delimited file of commands and SQL statements.")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .possible_values(&["text", "json"])
                .default_value("text")
                .help("Output format of the operator trees")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("no-pushdown")
                .long("no-pushdown")
                .help("Keeps every WHERE predicate in a filter above the FROM clause"),
        )
        .get_matches();

    let mut config = match matches.value_of("config") {
        Some(path) => match read_config(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{}", e);
                process::exit(1);
            }
        },
        None => ExplainConfig::default(),
    };
    if matches.is_present("no-pushdown") {
        config.planner.predicate_push_down = false;
    }
    let format = match matches.value_of("format") {
        Some("json") => OutputFormat::Json,
        _ => OutputFormat::Text,
    };

    info!("Starting explain session with config: {:?}", config);

    let session = match Session::new(config, format) {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to set up catalog: {}", e);
            process::exit(1);
        }
    };

    match matches.value_of("script") {
        Some(path) => match fs::read_to_string(path) {
            Ok(script) => process_script_input(&session, &script),
            Err(e) => error!("Failed to read script {}: {}", path, e),
        },
        None => process_cli_input(&session),
    }
    info!("Terminated.");
}
