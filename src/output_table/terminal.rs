//! Printing tables to a terminal in human-readable format (spaces for
//! padding, ANSI sequences for formatting), or as TSV.

//! Does not escape anything in the fields. Values containing tabs or
//! newlines make the output ambiguous.

use std::{
    borrow::Cow,
    fmt::Display,
    io::{BufWriter, IsTerminal, Write},
};

use anyhow::{Result, anyhow, bail};
use itertools::{EitherOrBoth, Itertools};
use strum_macros::EnumString;
use yansi::{Paint, Style};

#[derive(Debug, EnumString, PartialEq, Clone, Copy)]
#[strum(serialize_all = "kebab_case")]
pub enum ColorOpt {
    Auto,
    Always,
    Never,
}

impl ColorOpt {
    pub fn want_color(self, detected_terminal: bool) -> bool {
        match self {
            ColorOpt::Auto => detected_terminal,
            ColorOpt::Always => true,
            ColorOpt::Never => false,
        }
    }
}

#[derive(Debug, clap::Args, Clone)]
pub struct TerminalTableOpts {
    /// Show the table as TSV (with '\t' as separator) instead of
    /// human-readable
    #[clap(long)]
    pub tsv: bool,

    /// Whether to use ANSI codes to format human-readable output on
    /// terminals (auto, always, never)
    #[clap(long, default_value = "auto")]
    pub color: ColorOpt,
}

impl Default for TerminalTableOpts {
    fn default() -> Self {
        Self {
            tsv: false,
            color: ColorOpt::Auto,
        }
    }
}

impl TerminalTableOpts {
    pub fn want_color(&self, detected_terminal: bool) -> bool {
        let Self { tsv, color } = self;
        if *tsv {
            false
        } else {
            color.want_color(detected_terminal)
        }
    }
}

#[derive(Debug, Clone)]
pub struct TerminalTableTitle<'s> {
    pub text: Cow<'s, str>,
    /// How many columns this should span across; should normally be
    /// `1`
    pub span: usize,
}

impl<'s> TerminalTableTitle<'s> {
    pub fn new(text: impl Into<Cow<'s, str>>) -> Self {
        Self {
            text: text.into(),
            span: 1,
        }
    }
}

/// Sums up the widths of the columns each title spans. The last
/// title gets no width.
fn title_widths<'t>(
    titles: &'t [TerminalTableTitle],
    widths: &[usize],
) -> Vec<(&'t str, Option<usize>)> {
    let mut widths = widths.iter();
    titles
        .iter()
        .filter(|title| title.span > 0)
        .map(|TerminalTableTitle { text, span }| {
            let width = (0..*span)
                .map(|_| widths.next())
                .sum::<Option<usize>>();
            (text.as_ref(), width)
        })
        .collect()
}

/// Streams rows, which requires the column widths up front. A value
/// wider than its column still gets a single space before the next.
/// The last column has no width and no padding.
pub struct TerminalTable<'v, 's, O: Write> {
    pub opts: TerminalTableOpts,
    widths: Vec<usize>,
    titles: &'v [TerminalTableTitle<'s>],
    is_terminal: bool,
    out: BufWriter<O>,
}

impl<'v, 's, O: Write + IsTerminal> TerminalTable<'v, 's, O> {
    /// `widths` has one entry less than the logical number of columns
    /// of `titles`, and includes the spacing between columns.
    pub fn start(
        widths: &[usize],
        titles: &'v [TerminalTableTitle<'s>],
        opts: TerminalTableOpts,
        out: O,
    ) -> Result<Self> {
        let is_terminal = out.is_terminal();
        Self::start_with_terminal(widths, titles, opts, out, is_terminal)
    }
}

impl<'v, 's, O: Write> TerminalTable<'v, 's, O> {
    const MINIMAL_PADDING_LEN: usize = 1;

    /// Like `start`, for outputs that can't tell whether they are a
    /// terminal.
    pub fn start_with_terminal(
        widths: &[usize],
        titles: &'v [TerminalTableTitle<'s>],
        opts: TerminalTableOpts,
        out: O,
        is_terminal: bool,
    ) -> Result<Self> {
        let num_columns: usize = titles.iter().map(|t| t.span).sum();
        if num_columns.checked_sub(1) != Some(widths.len()) {
            bail!(
                "widths.len != number of columns - 1: {:?}",
                (widths.len(), num_columns)
            )
        }
        let mut slf = Self {
            opts,
            widths: widths.to_owned(),
            titles,
            is_terminal,
            out: BufWriter::new(out),
        };
        const STYLE: Style = Style::new().bold().italic();
        let style = slf.opts.want_color(slf.is_terminal).then_some(STYLE);
        let cells = title_widths(slf.titles, &slf.widths);
        slf.write_cells(cells, style)?;
        Ok(slf)
    }

    fn write_cells<'c>(
        &mut self,
        cells: impl IntoIterator<Item = (&'c str, Option<usize>)>,
        line_style: Option<Style>,
    ) -> Result<()> {
        for (i, (text, width)) in cells.into_iter().enumerate() {
            if self.opts.tsv && i > 0 {
                self.out.write_all(b"\t")?;
            }
            let text_len = text.chars().count();
            let minimal_padding_len;
            if let Some(style) = line_style {
                // the trailing space keeps italic text from being clipped
                let text = format!("{text} ");
                write!(self.out, "{}", text.as_str().paint(style))?;
                minimal_padding_len = Self::MINIMAL_PADDING_LEN.saturating_sub(1);
            } else {
                self.out.write_all(text.as_bytes())?;
                minimal_padding_len = Self::MINIMAL_PADDING_LEN;
            }
            if let Some(width) = width {
                if !self.opts.tsv {
                    let used = text_len + usize::from(line_style.is_some());
                    let padding = width.saturating_sub(used).max(minimal_padding_len);
                    write!(self.out, "{:padding$}", "")?;
                }
            }
        }
        self.out.write_all(b"\n")?;
        Ok(())
    }

    pub fn write_data_row<V: Display>(&mut self, data: &[V], line_style: Option<Style>) -> Result<()> {
        if data.len() != self.widths.len() + 1 {
            bail!(
                "row has {} values, table has {} columns",
                data.len(),
                self.widths.len() + 1
            )
        }
        let texts: Vec<String> = data.iter().map(|v| v.to_string()).collect();
        let widths = self.widths.clone();
        let cells = texts
            .iter()
            .zip_longest(widths)
            .filter_map(|either_or_both| match either_or_both {
                EitherOrBoth::Both(text, width) => Some((text.as_str(), Some(width))),
                EitherOrBoth::Left(text) => Some((text.as_str(), None)),
                EitherOrBoth::Right(_) => None,
            })
            .collect::<Vec<_>>();
        let line_style = line_style.filter(|_| self.opts.want_color(self.is_terminal));
        self.write_cells(cells, line_style)
    }

    pub fn finish(self) -> Result<O> {
        self.out
            .into_inner()
            .map_err(|e| anyhow!("flushing the buffer: {}", e.error()))
    }
}
