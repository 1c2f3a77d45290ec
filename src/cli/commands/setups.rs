//! `abcalc setups` command - list calculation setups

use miette::Result;

use crate::cli::helpers::Session;
use crate::cli::output::emit;
use crate::cli::GlobalOpts;
use crate::core::frame::{Cell, Frame};

#[derive(clap::Args, Debug)]
pub struct SetupsArgs {
    /// Also list the functional units and methods of each setup
    #[arg(long, short = 'l')]
    pub long: bool,
}

pub fn run(args: SetupsArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let global = &session.effective(global);
    let mut frame = if args.long {
        Frame::new("setups", ["setup", "functional units", "methods"])
    } else {
        Frame::new("setups", ["setup", "fus", "methods"])
    };
    for name in session.store.setup_names()? {
        let setup = session.store.setup(&name)?;
        let row = if args.long {
            let fus: Vec<String> = setup
                .inv
                .iter()
                .map(|fu| {
                    fu.entries()
                        .iter()
                        .map(|e| format!("{} {}", e.amount, e.key))
                        .collect::<Vec<_>>()
                        .join(" + ")
                })
                .collect();
            let methods: Vec<String> = setup.ia.iter().map(|m| m.label()).collect();
            vec![
                Cell::from(name),
                Cell::from(fus.join("; ")),
                Cell::from(methods.join("; ")),
            ]
        } else {
            vec![
                Cell::from(name),
                Cell::Number(setup.inv.len() as f64),
                Cell::Number(setup.ia.len() as f64),
            ]
        };
        frame.push_row(row);
    }
    emit(&frame, None, global)
}
