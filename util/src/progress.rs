use std::borrow::Cow;
use std::io::{self, Stdout, Write};
use std::time::Duration;

use pbr::ProgressBar;

/// Wraps an iterator with a progress bar that advances per item.
pub struct ReportingIterator<I, W = Stdout>
  where I: ExactSizeIterator,
        W: Write,
{
  name: Cow<'static, str>,
  progress: ProgressBar<W>,
  inner: I,
  done: bool,
}

impl<I> ReportingIterator<I, Stdout>
  where I: ExactSizeIterator,
{
  pub fn new<N>(inner: I, name: N) -> ReportingIterator<I, Stdout>
    where N: Into<Cow<'static, str>>,
  {
    ReportingIterator::on(io::stdout(), inner, name)
  }
}

impl<I, W> ReportingIterator<I, W>
  where I: ExactSizeIterator,
        W: Write,
{
  pub fn on<N>(out: W, inner: I, name: N) -> ReportingIterator<I, W>
    where N: Into<Cow<'static, str>>,
  {
    let name = name.into();
    let mut p = ProgressBar::on(out, inner.len() as u64);
    p.show_speed = true;
    p.show_percent = true;
    p.show_counter = true;
    p.show_time_left = true;

    let fps = Duration::new(1, 0) / 60;
    p.set_max_refresh_rate(Some(fps));

    let msg = format!("{}: ", name);
    p.message(&msg[..]);
    ReportingIterator {
      name,
      progress: p,
      inner,
      done: false,
    }
  }
}

impl<I, W> Iterator for ReportingIterator<I, W>
  where I: ExactSizeIterator,
        W: Write,
{
  type Item = I::Item;
  fn next(&mut self) -> Option<Self::Item> {
    match self.inner.next() {
      Some(v) => {
        self.progress.inc();
        Some(v)
      },
      None => {
        if !self.done {
          self.done = true;
          let msg = format!("{} done!\n", self.name);
          self.progress.finish_println(&msg);
          debug!(name = %self.name, "finished");
        }

        None
      },
    }
  }

  fn size_hint(&self) -> (usize, Option<usize>) { self.inner.size_hint() }
}

impl<I, W> ExactSizeIterator for ReportingIterator<I, W>
  where I: ExactSizeIterator,
        W: Write,
{ }

pub trait Reporting: ExactSizeIterator + Sized {
  fn reporting<N>(self, name: N) -> ReportingIterator<Self, Stdout>
    where N: Into<Cow<'static, str>>,
  {
    ReportingIterator::new(self, name)
  }
}
impl<I> Reporting for I
  where I: ExactSizeIterator,
{ }
