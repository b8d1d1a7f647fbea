//! queryshape CLI - translate between SQL and OData query options
//!
//! Usage:
//!   queryshape sql-to-odata <SQL> [--dialect <dialect>] [--config <file>]
//!   queryshape odata-to-sql --collection <NAME> <QUERY_STRING> [--dialect <dialect>]
//!
//! Examples:
//!   queryshape sql-to-odata "SELECT id, name FROM Product WHERE price > 100 LIMIT 10"
//!   queryshape odata-to-sql --collection Product '$filter=price gt 100&$top=10' --dialect sqlite

use clap::{Parser, Subcommand, ValueEnum};
use queryshape::config::Settings;
use queryshape::odata::{OpenDataFormatter, OpenDataParser, OpenDataQueryExpression};
use queryshape::query::QueryExpression;
use queryshape::sql::{Dialect, SqlFormatter, SqlParser};
use queryshape::QueryError;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "queryshape")]
#[command(about = "queryshape - translate queries between SQL and OData")]
#[command(version)]
struct Cli {
    /// Path to a queryshape.toml (defaults to ./queryshape.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQL dialect to read (sql-to-odata) or write (odata-to-sql)
    #[arg(short, long, global = true)]
    dialect: Option<DialectArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a SELECT statement and print OData query options as JSON
    SqlToOdata {
        /// The SQL text
        sql: String,
    },

    /// Parse an OData query string and print SQL
    OdataToSql {
        /// Collection (table) the options apply to
        #[arg(long)]
        collection: String,

        /// Query string such as `$filter=price gt 100&$top=10`
        query_string: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Generic,
    Sqlite,
    Postgres,
    Mysql,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Generic => Dialect::Generic,
            DialectArg::Sqlite => Dialect::Sqlite,
            DialectArg::Postgres => Dialect::Postgres,
            DialectArg::Mysql => Dialect::MySql,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "queryshape=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    };
    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::SqlToOdata { sql } => cmd_sql_to_odata(&settings, cli.dialect, &sql),
        Commands::OdataToSql {
            collection,
            query_string,
        } => cmd_odata_to_sql(&settings, cli.dialect, &collection, &query_string),
    }
}

fn cmd_sql_to_odata(settings: &Settings, dialect: Option<DialectArg>, sql: &str) -> ExitCode {
    let parser = SqlParser::for_dialect(dialect.map_or(settings.sql.parser_dialect, Dialect::from));

    let query = match parser.parse(sql) {
        Ok(q) => q,
        Err(e) => return report_error(&e, sql),
    };

    match OpenDataFormatter::with_settings(&settings.odata).format(&query) {
        Ok(options) => match serde_json::to_string_pretty(&options) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Output error: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => report_error(&e, sql),
    }
}

fn cmd_odata_to_sql(
    settings: &Settings,
    dialect: Option<DialectArg>,
    collection: &str,
    query_string: &str,
) -> ExitCode {
    let options: Vec<(String, String)> = match serde_urlencoded::from_str(query_string) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Invalid query string: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let parser = OpenDataParser::with_settings(&settings.odata);
    let mut query = QueryExpression::new();
    query.from_collection(collection);
    let mut parsed = OpenDataQueryExpression::new(query);

    // Option by option, so a syntax error can point into its own value.
    for (key, value) in &options {
        if let Err(e) = parser.apply_query_option(&mut parsed, key, value) {
            eprintln!("In {}:", key);
            return report_error(&e, value);
        }
    }
    if !parsed.expand.is_empty() {
        tracing::warn!("$expand has no SQL counterpart and is ignored");
    }

    let formatter = match dialect {
        Some(d) => SqlFormatter::for_dialect(d.into()),
        None => settings.sql.formatter(),
    };
    match formatter.format(&parsed.query) {
        Ok(sql) => {
            println!("{}", sql);
            ExitCode::SUCCESS
        }
        Err(e) => report_error(&e, query_string),
    }
}

fn report_error(error: &QueryError, source: &str) -> ExitCode {
    match error {
        QueryError::Syntax(parse_error) => eprint!("{}", parse_error.report(source)),
        other => eprintln!("Error: {}", other),
    }
    ExitCode::FAILURE
}
