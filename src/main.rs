mod options;

use anyhow::{Context, Result};
use clap::Parser;

use options::{Cli, FileConfig};
use textel::canvas::config::CanvasConfig;
use textel::symbols::SymbolMap;
use textel::term::stream::StreamReader;
use textel::term::Term;
use textel::util::calc_canvas_geometry;
use textel::{Canvas, GridLayout, MediaPipeline, PathQueue};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let file_config = FileConfig::load_or_default();

    match run(cli, file_config) {
        Ok(n_failed) if n_failed > 0 => std::process::exit(1),
        Ok(_) => {}
        Err(err) => {
            eprintln!("textel: {err:#}");
            std::process::exit(2);
        }
    }
}

/// Returns the number of inputs that produced no output.
fn run(cli: Cli, file_config: FileConfig) -> Result<usize> {
    if let Some(threads) = cli.threads.or(file_config.threads) {
        textel::set_n_threads(threads);
    }

    let mut term = Term::get_default().lock();
    if cli.probe {
        term.sync_probe(300);
    }

    let config = build_canvas_config(&cli, &file_config, &term)?;
    let (view_w, view_h) = view_size(&cli, &mut term)?;

    let queue = PathQueue::new();
    queue.push_list(cli.files.iter().cloned());
    if let Some(from) = &cli.files_from {
        let separator: &[u8] = if cli.null_separated { b"\0" } else { b"\n" };
        let fd = if from.as_os_str() == "-" {
            0
        } else {
            let file = std::fs::File::open(from)
                .with_context(|| format!("cannot open {}", from.display()))?;
            // The stream reader takes over the descriptor for the rest of
            // the run.
            std::os::fd::IntoRawFd::into_raw_fd(file)
        };
        queue.push_stream(StreamReader::from_fd_full(fd, separator));
    }
    queue.close();

    if cli.files.is_empty() && cli.files_from.is_none() {
        anyhow::bail!("no input files (try --help)");
    }

    let n_failed = if let Some(grid_spec) = &cli.grid {
        run_grid(&cli, grid_spec, config, &term, view_w, view_h, queue)?
    } else {
        run_sequential(&cli, config, &term, view_w, view_h, queue)?
    };

    term.flush();
    Ok(n_failed)
}

fn build_canvas_config(cli: &Cli, file_config: &FileConfig, term: &Term) -> Result<CanvasConfig> {
    let term_info = term.term_info();
    let mut config = CanvasConfig::new();

    let mode_request = cli
        .colors
        .as_deref()
        .or(file_config.colors.as_deref())
        .map(options::parse_canvas_mode)
        .transpose()?
        .flatten();
    config.set_canvas_mode(mode_request.unwrap_or_else(|| term_info.best_canvas_mode()));

    let mut symbol_map = match cli.symbols.as_deref().or(file_config.symbols.as_deref()) {
        Some(selectors) => {
            let mut map = SymbolMap::new();
            map.apply_selectors(selectors)?;
            map
        }
        None => SymbolMap::default(),
    };
    // Drop glyphs the terminal is not known to render correctly.
    symbol_map.remove_by_tags(!term_info.safe_symbol_tags());
    config.set_symbol_map(symbol_map);

    if let Some(selectors) = &cli.fill {
        let mut fill = SymbolMap::new();
        fill.apply_selectors(selectors)?;
        fill.remove_by_tags(!term_info.safe_symbol_tags());
        config.set_fill_symbol_map(Some(fill));
    }

    if let Some(fg) = &cli.fg {
        config.set_fg_color(options::parse_rgb(fg)?);
    } else if term.default_fg_color() >= 0 {
        config.set_fg_color(term.default_fg_color() as u32);
    }
    if let Some(bg) = &cli.bg {
        config.set_bg_color(options::parse_rgb(bg)?);
    } else if term.default_bg_color() >= 0 {
        config.set_bg_color(term.default_bg_color() as u32);
    }
    config.set_fg_only_enabled(cli.fg_only);

    if let Some(dither) = cli.dither.as_deref().or(file_config.dither.as_deref()) {
        config.set_dither_mode(options::parse_dither_mode(dither)?);
    }
    if let Some(grain) = &cli.dither_grain {
        let (w, h) = options::parse_dither_grain(grain)?;
        config.set_dither_grain(w, h)?;
    }
    if let Some(intensity) = cli.dither_intensity {
        config.set_dither_intensity(intensity)?;
    }

    if let Some(extractor) = &cli.color_extractor {
        config.set_color_extractor(options::parse_color_extractor(extractor)?);
    }
    if let Some(space) = &cli.color_space {
        config.set_color_space(options::parse_color_space(space)?);
    }
    if let Some(work) = cli.work.or(file_config.work) {
        config.set_work_factor(work)?;
    }
    if let Some(level) = cli.optimize {
        config.set_optimizations(options::optimizations_for_level(level));
    }

    let (cell_w, cell_h) = term.cell_size_px();
    if cell_w > 0 && cell_h > 0 {
        config.set_cell_size_px(cell_w, cell_h)?;
    }

    Ok(config)
}

fn view_size(cli: &Cli, term: &mut Term) -> Result<(i32, i32)> {
    let (mut w, mut h) = match &cli.size {
        Some(size) => options::parse_size(size)?,
        None => (-1, -1),
    };

    let (term_w, term_h) = term.get_size_cells();
    if w < 1 {
        w = if term_w > 0 { term_w } else { 80 };
    }
    if h < 1 {
        // Leave room for the prompt line.
        h = if term_h > 0 { term_h - 1 } else { 24 };
    }
    Ok((w.max(1), h.max(1)))
}

fn font_ratio(term: &Term) -> f32 {
    let (cell_w, cell_h) = term.cell_size_px();
    if cell_w > 0 && cell_h > 0 {
        cell_w as f32 / cell_h as f32
    } else {
        0.5
    }
}

fn run_grid(
    cli: &Cli,
    grid_spec: &str,
    config: CanvasConfig,
    term: &Term,
    view_w: i32,
    view_h: i32,
    queue: PathQueue,
) -> Result<usize> {
    let (n_cols, n_rows) = options::parse_grid(grid_spec)?;

    let mut grid = GridLayout::new(config, (**term.term_info()).clone());
    grid.set_view_size(view_w, view_h);
    grid.set_grid_size(n_cols, n_rows);
    grid.set_tuck(options::parse_tuck(cli.stretch, true));
    grid.set_print_labels(cli.label);
    if cli.halign.is_some() || cli.valign.is_some() {
        let h = match &cli.halign {
            Some(h) => options::parse_align(h)?,
            None => Default::default(),
        };
        let v = match &cli.valign {
            Some(v) => options::parse_align(v)?,
            None => Default::default(),
        };
        grid.set_align(h, v);
    }

    while let Some(path) = queue.pop() {
        grid.push_path(&path);
    }
    while grid.print_chunk(term) {}

    Ok(0)
}

fn run_sequential(
    cli: &Cli,
    config: CanvasConfig,
    term: &Term,
    view_w: i32,
    view_h: i32,
    queue: PathQueue,
) -> Result<usize> {
    let pipeline = MediaPipeline::new(queue, textel::n_threads());
    let mut n_failed = 0usize;

    while let Some(slot) = pipeline.pop() {
        let loader = match (slot.loader, slot.error) {
            (Some(loader), _) => loader,
            (None, error) => {
                let message = error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string());
                term.print_err(&format!("textel: {}: {}\n", slot.path, message));
                n_failed += 1;
                continue;
            }
        };

        let (pixel_type, pixels, src_w, src_h, rowstride) = loader.first_frame().data();

        let (mut w, mut h) = (view_w, view_h);
        calc_canvas_geometry(
            src_w,
            src_h,
            &mut w,
            &mut h,
            font_ratio(term),
            cli.zoom,
            cli.stretch,
        );

        let mut image_config = config.clone();
        image_config.set_geometry(w, h)?;
        let mut canvas = Canvas::new(&image_config);
        if let Err(err) = canvas.draw_all_pixels(pixel_type, pixels, src_w, src_h, rowstride) {
            term.print_err(&format!("textel: {}: {}\n", slot.path, err));
            n_failed += 1;
            continue;
        }

        term.write(&canvas.print(term.term_info()));
    }

    Ok(n_failed)
}
