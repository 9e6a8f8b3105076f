//! Interface de terminal do hcpt: barra de progresso e avisos coloridos.
//!
//! Usa `indicatif` para o progresso das consultas de drift e `console` para
//! cores. Tudo vai para stderr, deixando stdout só com a saída do comando.

use console::{Style, Term};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Progresso da consulta de assessments, um passo por workspace.
///
/// Fica oculto em modo JSON ou quando stderr não é um terminal.
#[derive(Clone)]
pub struct FetchProgress {
    pb: ProgressBar,
}

impl FetchProgress {
    pub fn start(total: usize, visible: bool) -> Self {
        if !visible || !Term::stderr().features().is_attended() {
            return Self::hidden();
        }

        let pb = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} Checking drift [{bar:30.cyan/blue}] {pos}/{len}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
        pb.set_style(style);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self { pb }
    }

    pub fn hidden() -> Self {
        Self {
            pb: ProgressBar::hidden(),
        }
    }

    /// Um workspace resolvido.
    pub fn inc(&self) {
        self.pb.inc(1);
    }

    #[cfg(test)]
    pub fn position(&self) -> u64 {
        self.pb.position()
    }

    /// Remove a barra antes de a tabela ser impressa.
    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

/// `Warning: <msg>` em amarelo no stderr.
pub fn warn(message: &str) {
    let yellow = Style::new().yellow().for_stderr();
    eprintln!("{} {message}", yellow.apply_to("Warning:"));
}

/// `Error: <msg>` em vermelho no stderr.
pub fn error(message: &str) {
    let red = Style::new().red().bold().for_stderr();
    eprintln!("{} {message}", red.apply_to("Error:"));
}
