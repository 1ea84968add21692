use isocore::algorithm::isotope::Iso;
use isocore::data::tabulator::Tabulator;

fn main() {
    let iso = Iso::new("C6H12O6").expect("valid formula");
    let generator = iso.threshold_generator(1e-6, false).expect("valid threshold");
    let table = Tabulator::new(generator, true);

    println!("{} isotopologues above threshold", table.size());
    for idx in 0..table.size().min(10) {
        println!(
            "mass: {:.6} probability: {:.3e} configuration: {:?}",
            table.mass(idx),
            table.prob(idx),
            table.conf(idx).unwrap()
        );
    }

    let spectrum = table.to_spectrum(1).to_resolution(1);
    println!("aggregated isotope pattern: {:?}", spectrum.mz);
}
