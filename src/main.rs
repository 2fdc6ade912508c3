// ============================================================================
// Helium implantation in tungsten, 0D
//
// Builds a He/V/I network, implants He1 at a constant rate together with a
// small Frenkel-pair source, and integrates the reaction system with a
// diagonally implicit Euler step, (1 - dt J_ii) dc_i = dt f_i.
// A stand-in for the Newton-Krylov solver that normally drives the network.
// ============================================================================

use log::info;

use defect_network::{
    Composition, GridPoint, NetworkError, NetworkOptions, PsiMaterial, PsiSpecies, ReactionNetwork, Species,
    TotalKind, TotalQuantity,
};

/// He1 implantation rate [atoms / nm^3 / s].
const HELIUM_FLUX: f64 = 4.0e-4;
/// Frenkel pairs per implanted helium.
const FRENKEL_RATIO: f64 = 0.05;
const TEMPERATURE: f64 = 1000.0;
const FINAL_TIME: f64 = 1.0e-2;
const OUTPUT_STEPS: usize = 10;
const SUB_STEPS: usize = 1000;

fn main() -> Result<(), NetworkError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("═══════════════════════════════════════════════════════════════");
    println!("  defect-network: helium implantation in tungsten (0D)");
    println!("═══════════════════════════════════════════════════════════════\n");

    let mut options = NetworkOptions { temperature: TEMPERATURE, ..Default::default() };
    options.reactions.sink = true;
    let mut network = ReactionNetwork::<PsiMaterial>::new(&[8, 0, 0, 4, 4], 1, options)?;

    let he1 = network.require_cluster(&Composition::from_slice(&[1, 0, 0, 0, 0]))?;
    let v1 = network.require_cluster(&Composition::from_slice(&[0, 0, 0, 1, 0]))?;
    let i1 = network.require_cluster(&Composition::from_slice(&[0, 0, 0, 0, 1]))?;

    println!("  Clusters: {}  DOFs: {}", network.num_clusters(), network.num_dofs());
    println!("  Reactions: {}", network.reactions().len());
    println!("  Jacobian entries: {}", network.connectivity().nnz());
    println!("  Largest rate: {:.3e} 1/s", network.get_largest_rate());
    println!("  Memory: {:.1} KiB", network.memory_bytes() as f64 / 1024.0);

    let n = network.num_dofs();
    let fill = network.get_diagonal_fill();
    let widest = fill.values().map(|cols| cols.len()).max().unwrap_or(0);
    println!("  Widest Jacobian row: {} of {} columns\n", widest, n);
    let diagonal: Vec<usize> = (0..n).filter_map(|row| network.connectivity().offset(row, row)).collect();

    let quantities = [
        TotalQuantity::new(TotalKind::Atom, PsiSpecies::He.index(), 0),
        TotalQuantity::new(TotalKind::Trapped, PsiSpecies::He.index(), 0),
        TotalQuantity::new(TotalKind::Concentration, PsiSpecies::V.index(), 0),
        TotalQuantity::new(TotalKind::Concentration, PsiSpecies::He.index(), 5),
    ];

    let point = GridPoint::at(0);
    let mut conc = vec![0.0; n];
    let mut fluxes = vec![0.0; n];
    let mut partials = vec![0.0; network.connectivity().nnz()];
    let dt = FINAL_TIME / (OUTPUT_STEPS * SUB_STEPS) as f64;
    let mut time = 0.0;

    for _ in 0..OUTPUT_STEPS {
        for _ in 0..SUB_STEPS {
            fluxes.iter_mut().for_each(|f| *f = 0.0);
            partials.iter_mut().for_each(|p| *p = 0.0);
            network.compute_all_fluxes(&conc, &mut fluxes, &point)?;
            network.compute_all_partials(&conc, &mut partials, &point)?;
            fluxes[he1] += HELIUM_FLUX;
            fluxes[v1] += FRENKEL_RATIO * HELIUM_FLUX;
            fluxes[i1] += FRENKEL_RATIO * HELIUM_FLUX;

            for ((c, f), &o) in conc.iter_mut().zip(&fluxes).zip(&diagonal) {
                *c += dt * f / (1.0 - dt * partials[o]);
            }
            // Only cluster averages must stay non-negative.
            conc[..network.num_clusters()].iter_mut().for_each(|c| *c = c.max(0.0));
            time += dt;
        }
        network.set_time(time);

        let totals = network.get_totals(&conc, &quantities)?;
        println!(
            "  t={:.2e} s | He={:.3e} | He in V={:.3e} | V clusters={:.3e} | He>=5={:.3e}",
            time, totals[0], totals[1], totals[2], totals[3]
        );
    }

    let implanted = HELIUM_FLUX * FINAL_TIME;
    let retained = network.get_total_atom_concentration(&conc, PsiSpecies::He, 0)?;
    info!("{} steps, helium {:.3e} retained of {:.3e} implanted", OUTPUT_STEPS * SUB_STEPS, retained, implanted);
    let header = network.get_header_string();
    let largest = header.split(' ').nth(network.get_largest_cluster_id()).unwrap_or("-");
    println!("\nLargest cluster: {largest}");
    Ok(())
}
