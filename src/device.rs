//! The output boundary: finished display lists are handed to a device chosen
//! by the /OutputDevice name of the page-device dictionary. Rasterization is
//! entirely the device's business.

use log::debug;

use crate::{
    context::Context,
    error::PsResult,
    graphics::{display_list::DisplayElement, page_device::PageDevice},
};

/// An output device consuming finished pages.
pub trait Device {
    /// The /OutputDevice name this device answers to.
    fn name(&self) -> &[u8];

    /// Receives one finished page and the page-device configuration in force
    /// when showpage ran.
    fn showpage(&mut self, page: Vec<DisplayElement>, device: &PageDevice) -> PsResult<()>;
}

/// Routes the current display list to its device. `keep` preserves the list
/// and graphics state (`copypage`); otherwise the page ends.
pub(crate) fn hand_off_page(ctx: &mut Context, keep: bool) -> PsResult<()> {
    let page = if keep {
        ctx.display_list.clone_page()
    } else {
        ctx.display_list.take_page()
    };

    let target = ctx.page_device.output_device.clone();
    debug!(
        "page hand-off: {} elements to {}",
        page.len(),
        String::from_utf8_lossy(&target)
    );

    if target == b"null" {
        return Ok(());
    }

    if let Some(pos) = ctx.devices.iter().position(|d| d.name() == &target[..]) {
        let config = ctx.page_device.clone();
        return ctx.devices[pos].showpage(page, &config);
    }

    // no registered device claims the name: collect for the host
    ctx.pages.push(page);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::run_source;

    struct Counting {
        pages: std::rc::Rc<std::cell::RefCell<usize>>,
    }

    impl Device for Counting {
        fn name(&self) -> &[u8] {
            b"counting"
        }

        fn showpage(&mut self, page: Vec<DisplayElement>, _device: &PageDevice) -> PsResult<()> {
            assert!(!page.is_empty());
            *self.pages.borrow_mut() += 1;
            Ok(())
        }
    }

    #[test]
    fn registered_device_claims_matching_pages() {
        let pages = std::rc::Rc::new(std::cell::RefCell::new(0));
        let mut ctx = Context::new(true);
        ctx.devices.push(Box::new(Counting { pages: pages.clone() }));

        run_source(
            &mut ctx,
            b"<< /OutputDevice /counting >> setpagedevice 0 0 10 10 rectfill showpage",
        )
        .unwrap();

        assert_eq!(*pages.borrow(), 1);
        assert!(ctx.pages.is_empty());
    }

    #[test]
    fn null_device_discards_pages() {
        let mut ctx = Context::new(true);
        run_source(&mut ctx, b"nulldevice 0 0 10 10 rectfill showpage").unwrap();
        assert!(ctx.pages.is_empty());
    }

    #[test]
    fn unclaimed_pages_are_collected() {
        let mut ctx = Context::new(true);
        run_source(&mut ctx, b"0 0 10 10 rectfill showpage").unwrap();
        assert_eq!(ctx.pages.len(), 1);
    }
}
