//! # ribd CLI
//!
//! The same binary runs the daemon (`ribd run`) and queries a running instance
//! over its JSON-RPC API (127.0.0.1:50051 by default, see `--host` and `--port`).
//!
//! ```sh
//! $ ribd start 65000 10.0.0.1 --multipath
//! $ ribd advertise 10.10.0.0/16 192.0.2.1 --as-path "65100 65200" --local-pref 300
//! $ ribd show rib ipv4-unicast
//!     Prefix        Next Hop   Source  ID  Age       Origin      Local Pref  Metric  AS Path      Communities
//! ---+-------------+----------+-------+---+---------+-----------+-----------+-------+------------+-------------
//!  *  10.10.0.0/16  192.0.2.1  API     0   00:00:04  Incomplete  300                 65100 65200
//! $ ribd show table ipv6-unicast
//! ```

use std::error::Error;
use std::net::{IpAddr, SocketAddr};

use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use colored::*;
use ipnetwork::IpNetwork;

use crate::api::client::{connect, list_destinations};
use crate::api::paths::{encode_path, encode_prefix};
use crate::api::{
    AddPathRequest, ApiClient, DeletePathRequest, GetTableRequest, Global, ListPathRequest,
    LookupOption, Path, RouteSpec, TableLookupPrefix, TableType,
};
use crate::rib::{Family, PathSource};
use crate::utils::{asn_from_dotted, parse_route_spec};

mod display;
mod table;

use display::PathRow;
use table::OutputTable;

#[derive(Parser, Debug)]
#[command(name = "ribd", rename_all = "kebab-case")]
/// BGP RIB daemon and CLI
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
    /// API host of a running ribd
    #[arg(long, default_value = "127.0.0.1", global = true)]
    pub host: IpAddr,
    /// API port of a running ribd
    #[arg(short, long, default_value_t = 50051, global = true)]
    pub port: u16,
    /// Show debug logs (additive for trace logs)
    #[arg(short, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
pub enum Command {
    /// Run the ribd daemon
    Run(RunOptions),
    /// Start BGP on a running daemon
    Start(StartOptions),
    /// Stop BGP, dropping every path
    Stop,
    /// View BGP config and RIB contents
    #[command(alias = "s", subcommand)]
    Show(Show),
    /// Add a path to the global RIB
    Advertise(Route),
    /// Withdraw a path added with `advertise`
    Withdraw(WithdrawOptions),
    /// Withdraw every path added over the API for a family
    WithdrawAll(FamilyOptions),
}

#[derive(ClapArgs, Debug)]
pub struct RunOptions {
    /// Path to ribd config.toml, defaults are used when omitted
    pub config_path: Option<String>,
}

#[derive(ClapArgs, Debug)]
#[command(rename_all = "kebab-case")]
pub struct StartOptions {
    /// Local AS (E.g. 65000 or 1.100)
    asn: String,
    /// Router ID (IPv4 Address)
    router_id: String,
    /// Peer listener port, -1 to not listen for peers
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    listen_port: i32,
    /// Peer listener addresses (defaults to all)
    #[arg(long)]
    listen_address: Vec<String>,
    /// Enabled families (defaults to IPv4 and IPv6 unicast)
    #[arg(short, long)]
    family: Vec<Family>,
    /// Select multiple best paths
    #[arg(short, long)]
    multipath: bool,
    /// LOCAL_PREF for paths that carry none (defaults to 100)
    #[arg(long)]
    default_local_pref: Option<u32>,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
pub enum Show {
    /// BGP global config
    #[command(alias = "g")]
    Global,
    /// Destinations and their paths
    #[command(alias = "r")]
    Rib(RibOptions),
    /// Destination and path counts
    #[command(alias = "t")]
    Table(FamilyOptions),
}

#[derive(ClapArgs, Debug)]
#[command(rename_all = "kebab-case")]
pub struct RibOptions {
    /// Family of the table (E.g. ipv6-unicast)
    #[arg(default_value = "ipv4-unicast")]
    family: Family,
    /// Only show this prefix
    prefix: Option<IpNetwork>,
    /// Include more specifics of the prefix
    #[arg(long, conflicts_with = "shorter")]
    longer: bool,
    /// Include less specifics of the prefix
    #[arg(long)]
    shorter: bool,
    /// Only show best path(s)
    #[arg(short, long)]
    best: bool,
    /// Show the paths received from this neighbor
    #[arg(long)]
    neighbor: Option<IpAddr>,
}

#[derive(ClapArgs, Debug)]
pub struct FamilyOptions {
    /// Family of the table (E.g. ipv6-unicast)
    #[arg(default_value = "ipv4-unicast")]
    family: Family,
}

#[derive(ClapArgs, Debug)]
#[command(rename_all = "kebab-case")]
pub struct Route {
    /// Prefix to advertise
    prefix: IpNetwork,
    /// Next Hop for this route
    next_hop: IpAddr,
    /// Path identifier, replaces an earlier path with the same identifier
    #[arg(short, long, default_value_t = 0)]
    identifier: u32,
    /// Origin (defaults to Incomplete)
    #[arg(short, long)]
    origin: Option<String>,
    /// AS Path (e.g. --as-path "100 200 65000.100"), defaults to an empty path
    #[arg(short, long)]
    as_path: Option<String>,
    /// Local Pref
    #[arg(short = 'l', long)]
    local_pref: Option<u32>,
    /// Multi-exit-discriminator
    #[arg(long)]
    med: Option<u32>,
    /// Communities (e.g. --communities "65000:100 no-export")
    #[arg(short, long)]
    communities: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct WithdrawOptions {
    /// Prefix to withdraw
    prefix: IpNetwork,
    /// Path identifier used when advertising
    #[arg(short, long, default_value_t = 0)]
    identifier: u32,
}

impl Route {
    fn to_spec(&self) -> RouteSpec {
        let mut spec = RouteSpec::new(self.prefix, self.next_hop);
        spec.identifier = self.identifier;
        spec.attributes.origin = self.origin.clone();
        spec.attributes.local_pref = self.local_pref;
        spec.attributes.multi_exit_disc = self.med;
        if let Some(as_path) = &self.as_path {
            spec.attributes.as_path = as_path.split_whitespace().map(String::from).collect();
        }
        if let Some(communities) = &self.communities {
            spec.attributes.communities =
                communities.split_whitespace().map(String::from).collect();
        }
        spec
    }
}

impl StartOptions {
    fn to_global(&self) -> Result<Global, Box<dyn Error>> {
        let mut global = Global::new(asn_from_dotted(&self.asn)?, self.router_id.clone());
        global.listen_port = self.listen_port;
        global.listen_addresses = self.listen_address.clone();
        global.families = self.family.clone();
        global.use_multiple_paths = self.multipath;
        global.default_local_pref = self.default_local_pref;
        Ok(global)
    }
}

impl RibOptions {
    fn to_request(&self) -> ListPathRequest {
        let mut request = ListPathRequest::new(self.family);
        request.best_path_only = self.best;
        if let Some(neighbor) = self.neighbor {
            request.table_type = TableType::AdjIn;
            request.neighbor = Some(neighbor);
        }
        if let Some(prefix) = self.prefix {
            let lookup = if self.longer {
                LookupOption::Longer
            } else if self.shorter {
                LookupOption::Shorter
            } else {
                LookupOption::Exact
            };
            request.prefixes.push(TableLookupPrefix { prefix, lookup });
        }
        request
    }
}

async fn run_cmd(args: &Args) -> Result<(), Box<dyn Error>> {
    let client = connect(&SocketAddr::new(args.host, args.port)).await?;
    match &args.cmd {
        Command::Start(options) => {
            let global = options.to_global()?;
            client.start_bgp(global).await?;
            println!("BGP started");
        }
        Command::Stop => {
            client.stop_bgp().await?;
            println!("BGP stopped");
        }
        Command::Show(show) => match show {
            Show::Global => {
                let global = client.get_bgp().await?;
                let mut table = OutputTable::new();
                table.add_row(&global);
                table.print();
            }
            Show::Rib(options) => {
                let destinations = list_destinations(&client, options.to_request()).await?;
                let mut table = OutputTable::new();
                for destination in &destinations {
                    for path in &destination.paths {
                        table.add_row(&PathRow::new(&destination.prefix, path));
                    }
                }
                if table.is_empty() {
                    println!("No paths for {}", options.family);
                } else {
                    table.print();
                }
            }
            Show::Table(options) => {
                let request = GetTableRequest {
                    table_type: TableType::Global,
                    neighbor: None,
                    family: options.family,
                };
                let info = client.get_table(request).await?;
                let mut table = OutputTable::new();
                table.add_row(&info);
                table.print();
            }
        },
        Command::Advertise(route) => {
            // Validate locally first so a bad attribute never reaches the daemon
            let path = parse_route_spec(&route.to_spec(), PathSource::Api)?;
            let request = AddPathRequest {
                table_type: TableType::Global,
                path: encode_path(&path, false)?,
            };
            let response = client.add_path(request).await?;
            println!("Added path to RIB:");
            let destination = &response.destination;
            let mut table = OutputTable::new();
            for path in &destination.paths {
                table.add_row(&PathRow::new(&destination.prefix, path));
            }
            table.print();
        }
        Command::Withdraw(options) => {
            let family = Family::for_prefix(&options.prefix);
            let path = Path::new(
                family,
                encode_prefix(&options.prefix)?,
                vec![],
                options.identifier,
            );
            let request = DeletePathRequest {
                table_type: TableType::Global,
                family,
                path: Some(path),
            };
            let response = client.delete_path(request).await?;
            println!("Withdrew {} path(s)", response.withdrawn);
        }
        Command::WithdrawAll(options) => {
            let request = DeletePathRequest {
                table_type: TableType::Global,
                family: options.family,
                path: None,
            };
            let response = client.delete_path(request).await?;
            println!("Withdrew {} path(s)", response.withdrawn);
        }
        Command::Run(_) => unreachable!("the daemon is started from main"),
    }
    Ok(())
}

/// ribd interactive commands (other than running the daemon)
pub async fn query_ribd(args: &Args) {
    if let Err(err) = run_cmd(args).await {
        eprintln!("{}", err.to_string().red());
    }
}
