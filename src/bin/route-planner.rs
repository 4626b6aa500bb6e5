use clap::{Parser, Subcommand};
use lazy_regex::regex;
use log::{error, info};
use route_planner::codec::{self, GpxRoute};
use route_planner::storage::FileStorage;
use route_planner::store::RouteDetails;
use route_planner::{
    Config, Error, Osrm, Point, RouteDraft, RouteState, RouteStore, RoutingBackend,
};
use std::path::{Path, PathBuf};

/// Plan cycling routes against an OSRM server and manage saved routes
#[derive(Parser)]
struct Args {
    /// Configuration file
    #[clap(long, global = true, default_value = "route-planner.json")]
    config: PathBuf,

    /// Directory holding saved routes; defaults to the XDG data directory
    #[clap(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log requests and other details
    #[clap(long, short, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute a route through points given as lat,lon
    Route {
        /// Points in visit order, e.g. 52.52,13.405
        #[clap(required = true, num_args = 1..)]
        points: Vec<String>,

        /// Return to the first point at the end
        #[clap(long)]
        round_trip: bool,

        /// Write the route as GPX to this file
        #[clap(long)]
        gpx: Option<PathBuf>,

        /// Simplification threshold for the GPX track, in degrees
        #[clap(long, default_value_t = 0.00005)]
        simplify: f64,

        /// Save the route under this name
        #[clap(long)]
        save: Option<String>,

        /// Description to save with the route
        #[clap(long, default_value = "")]
        description: String,

        /// Replace a saved route with the same name
        #[clap(long)]
        overwrite: bool,
    },

    /// List saved routes
    List,

    /// Rename a saved route
    Rename {
        /// Id of the route
        id: String,

        /// The new name
        name: String,

        /// Replace a saved route that already has the new name
        #[clap(long)]
        overwrite: bool,
    },

    /// Delete a saved route
    Delete {
        /// Id of the route
        id: String,
    },

    /// Export saved routes as JSON
    Export {
        /// Ids of the routes; all routes if none are given
        ids: Vec<String>,

        /// File to write; standard output if not given
        #[clap(long, short)]
        output: Option<PathBuf>,
    },

    /// Import saved routes from exported JSON
    Import {
        /// The exported file
        file: PathBuf,

        /// Replace saved routes with the same name
        #[clap(long)]
        overwrite: bool,
    },

    /// Route the points of a GPX file and save the result
    ImportGpx {
        /// The GPX file
        file: PathBuf,

        /// Name to save under; taken from the file if not given
        #[clap(long)]
        name: Option<String>,

        /// Replace a saved route with the same name
        #[clap(long)]
        overwrite: bool,
    },
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose {
        log::Level::Debug
    } else {
        log::Level::Info
    };
    simple_logger::init_with_level(level).unwrap();

    if let Err(e) = run(args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Error> {
    match args.command {
        Command::Route {
            points,
            round_trip,
            gpx,
            simplify,
            save,
            description,
            overwrite,
        } => {
            let osrm = router(&args.config)?;
            let points = points
                .iter()
                .map(|s| parse_point(s))
                .collect::<Result<Vec<_>, _>>()?;

            let points = points
                .into_iter()
                .map(|p| osrm.snap_to_nearest_road(&p).unwrap_or(p))
                .collect();

            // Set up the round trip while empty so only one route is requested
            let mut draft = RouteDraft::new();
            if round_trip {
                draft.toggle_round_trip(&osrm);
            }
            draft.replace_points(&osrm, points);
            ensure_routed(&draft)?;

            println!("{:.2} km", draft.distance_meters() / 1000.0);

            if let Some(path) = gpx {
                let name = save.clone().unwrap_or_default();
                write_gpx(&path, &draft, &name, simplify)?;
            }

            if let Some(name) = save {
                let mut store = store(args.data_dir.as_deref())?;
                let saved = store.save(RouteDetails::from_draft(&draft, &name, &description), |_| {
                    overwrite
                })?;
                println!("{}", saved.id);
            }
        }
        Command::List => {
            let store = store(args.data_dir.as_deref())?;
            for route in store.list() {
                println!(
                    "{}\t{}\t{:.2} km{}",
                    route.id,
                    route.name,
                    route.distance_meters / 1000.0,
                    if route.is_round_trip { "\tround trip" } else { "" }
                );
            }
        }
        Command::Rename {
            id,
            name,
            overwrite,
        } => {
            let mut store = store(args.data_dir.as_deref())?;
            store.rename(&id, &name, |_| overwrite)?;
        }
        Command::Delete { id } => {
            let mut store = store(args.data_dir.as_deref())?;
            store.delete(&id)?;
        }
        Command::Export { ids, output } => {
            let store = store(args.data_dir.as_deref())?;
            let ids: Vec<String> = if ids.is_empty() {
                store.list().into_iter().map(|r| r.id).collect()
            } else {
                ids
            };
            let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
            let document = store.export_selected(&ids)?;

            match output {
                Some(path) => write_file(&path, &document)?,
                None => println!("{}", document),
            }
        }
        Command::Import { file, overwrite } => {
            let mut store = store(args.data_dir.as_deref())?;
            let document = read_file(&file)?;
            let summary = store.import_from(&document, |_| overwrite)?;
            println!("{} imported, {} skipped", summary.imported, summary.skipped);
        }
        Command::ImportGpx {
            file,
            name,
            overwrite,
        } => {
            let osrm = router(&args.config)?;
            let decoded = codec::decode(&read_file(&file)?, osrm.max_waypoints())?;

            let mut draft = RouteDraft::new();
            draft.replace_points(&osrm, decoded.points);
            ensure_routed(&draft)?;

            let name = name.unwrap_or(decoded.name);
            let mut store = store(args.data_dir.as_deref())?;
            let saved = store.save(RouteDetails::from_draft(&draft, &name, ""), |_| overwrite)?;
            draft.mark_saved(&saved.id);
            println!("{}\t{:.2} km", saved.id, saved.distance_meters / 1000.0);
        }
    }

    Ok(())
}

fn router(config_path: &Path) -> Result<Osrm, Error> {
    let config = Config::load(config_path)?;
    Osrm::from_config(&config.routing)
}

fn store(data_dir: Option<&Path>) -> Result<RouteStore<FileStorage>, Error> {
    let storage = match data_dir {
        Some(dir) => FileStorage::new(dir)?,
        None => FileStorage::home()?,
    };
    Ok(RouteStore::new(storage))
}

fn parse_point(s: &str) -> Result<Point, Error> {
    let m = regex!(r"^\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)\s*$")
        .captures(s)
        .ok_or_else(|| Error::InvalidInput(format!("expected lat,lon, got {:?}", s)))?;

    let coordinate = |i: usize| {
        m[i].parse::<f64>()
            .map_err(|e| Error::InvalidInput(format!("{:?}: {}", s, e)))
    };
    let (lat, lon) = (coordinate(1)?, coordinate(2)?);

    if lat.abs() > 90.0 || lon.abs() > 180.0 {
        return Err(Error::InvalidInput(format!("{:?} is out of range", s)));
    }
    Ok(Point::new(lat, lon))
}

fn ensure_routed(draft: &RouteDraft) -> Result<(), Error> {
    match draft.state() {
        RouteState::Routed => Ok(()),
        RouteState::Empty | RouteState::Incomplete => Err(Error::InvalidInput(
            "at least two points are needed".to_string(),
        )),
        RouteState::Stale => Err(Error::NoRouteFound),
    }
}

fn write_gpx(path: &Path, draft: &RouteDraft, name: &str, threshold: f64) -> Result<(), Error> {
    let route = GpxRoute {
        name: name.to_string(),
        waypoints: draft.points().to_vec(),
        geometry: draft
            .geometry()
            .map(|g| g.coordinates.clone())
            .unwrap_or_default(),
    };
    let text = codec::encode(&[route], true, threshold)?;
    write_file(path, &text)?;
    info!("Wrote {}", path.display());
    Ok(())
}

fn read_file(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::InvalidInput(format!("{}: {}", path.display(), e)))
}

fn write_file(path: &Path, text: &str) -> Result<(), Error> {
    std::fs::write(path, text)
        .map_err(|e| Error::Storage(format!("{}: {}", path.display(), e)))
}
