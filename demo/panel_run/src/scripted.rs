//! Offline scripted storefront, so the demo needs no real browser.
//!
//! A tiny page graph (home → search → product → cart → checkout →
//! confirmation) reacts to the visitor's actions. Reaching the order
//! confirmation terminates the session with a perfect score; everything else
//! just moves the visitor around the graph.

use async_trait::async_trait;
use footfall_core::{Action, PageObservation, StepOutcome, WebEnvironment};
use footfall_core::{EnvFactory, Result};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Home,
    Search,
    Product,
    Cart,
    Checkout,
    Confirmation,
}

impl Page {
    fn path(self) -> &'static str {
        match self {
            Page::Home => "",
            Page::Search => "search?q=jackets",
            Page::Product => "product/alpine-shell",
            Page::Cart => "cart",
            Page::Checkout => "checkout",
            Page::Confirmation => "order/confirmed",
        }
    }
}

/// Hands out one fresh [`StorefrontEnv`] per session.
pub struct ScriptedStorefront;

#[async_trait]
impl EnvFactory for ScriptedStorefront {
    async fn open(&self, start_url: &str) -> Result<Box<dyn WebEnvironment>> {
        Ok(Box::new(StorefrontEnv::new(start_url)))
    }
}

/// One visitor's view of the storefront.
pub struct StorefrontEnv {
    base_url: String,
    current: Page,
    history: Vec<Page>,
    cart_items: usize,
}

impl StorefrontEnv {
    fn new(start_url: &str) -> Self {
        Self {
            base_url: start_url.trim_end_matches('/').to_string(),
            current: Page::Home,
            history: Vec::new(),
            cart_items: 0,
        }
    }

    fn url(&self) -> String {
        format!("{}/{}", self.base_url, self.current.path())
    }

    fn goto(&mut self, page: Page) {
        if page != self.current {
            self.history.push(self.current);
            self.current = page;
        }
    }

    fn page(&self) -> PageObservation {
        let (html, clickable) = match self.current {
            Page::Home => (
                "<html><body><h1>Trailhead Outfitters</h1>\
                 <input placeholder='Search our catalog'/>\
                 <nav>Jackets · Footwear · Camping</nav>\
                 <div class='hero'>Autumn sale: up to 40% off shells</div>\
                 </body></html>"
                    .to_string(),
                vec![
                    "search box".to_string(),
                    "jackets category".to_string(),
                    "autumn sale banner".to_string(),
                    "cart".to_string(),
                ],
            ),
            Page::Search => (
                "<html><body><h1>Search results: jackets</h1>\
                 <ul><li>Alpine Shell Jacket — $89 — waterproof</li>\
                 <li>Budget Rain Jacket — $45</li>\
                 <li>Down Parka — $210</li></ul>\
                 </body></html>"
                    .to_string(),
                vec![
                    "alpine shell jacket".to_string(),
                    "budget rain jacket".to_string(),
                    "sort by price".to_string(),
                    "cart".to_string(),
                ],
            ),
            Page::Product => (
                "<html><body><h1>Alpine Shell Jacket</h1>\
                 <p>$89 · waterproof 10k · sizes S–XL</p>\
                 <p class='stock'>In stock, ships tomorrow</p>\
                 <section>128 reviews · 4.6 stars</section>\
                 </body></html>"
                    .to_string(),
                vec![
                    "add to cart".to_string(),
                    "size guide".to_string(),
                    "reviews".to_string(),
                    "cart".to_string(),
                ],
            ),
            Page::Cart => {
                let body = if self.cart_items > 0 {
                    "<html><body><h1>Your cart</h1>\
                     <p>Alpine Shell Jacket — $89</p><p>Shipping: free over $75</p>\
                     </body></html>"
                } else {
                    "<html><body><h1>Your cart</h1><p>Your cart is empty.</p></body></html>"
                };
                let mut clickable = vec!["keep shopping".to_string()];
                if self.cart_items > 0 {
                    clickable.insert(0, "proceed to checkout".to_string());
                    clickable.push("remove item".to_string());
                }
                (body.to_string(), clickable)
            }
            Page::Checkout => (
                "<html><body><h1>Checkout</h1>\
                 <p>Alpine Shell Jacket — $89 · free shipping</p>\
                 <form>Name, address, card on file</form>\
                 </body></html>"
                    .to_string(),
                vec!["place order".to_string(), "edit shipping".to_string()],
            ),
            Page::Confirmation => (
                "<html><body><h1>Order confirmed</h1>\
                 <p>Thanks! Your jacket ships tomorrow.</p></body></html>"
                    .to_string(),
                vec!["back to home".to_string()],
            ),
        };
        PageObservation {
            url: self.url(),
            html,
            clickable_elements: clickable,
            tabs: vec!["Home".to_string(), "Deals".to_string(), "Help".to_string()],
        }
    }

    fn click(&mut self, target: &str) {
        let target = target.to_lowercase();
        let next = match self.current {
            Page::Home => {
                if target.contains("cart") {
                    Some(Page::Cart)
                } else if target.contains("search") || target.contains("jacket") || target.contains("sale") {
                    Some(Page::Search)
                } else {
                    None
                }
            }
            Page::Search => {
                if target.contains("cart") {
                    Some(Page::Cart)
                } else if target.contains("jacket") || target.contains("parka") {
                    Some(Page::Product)
                } else {
                    None
                }
            }
            Page::Product => {
                if target.contains("add to cart") {
                    self.cart_items += 1;
                    Some(Page::Cart)
                } else if target.contains("cart") {
                    Some(Page::Cart)
                } else {
                    None
                }
            }
            Page::Cart => {
                if target.contains("checkout") && self.cart_items > 0 {
                    Some(Page::Checkout)
                } else if target.contains("remove") {
                    self.cart_items = self.cart_items.saturating_sub(1);
                    None
                } else if target.contains("shopping") {
                    Some(Page::Search)
                } else {
                    None
                }
            }
            Page::Checkout => {
                if target.contains("place order") {
                    Some(Page::Confirmation)
                } else {
                    None
                }
            }
            Page::Confirmation => {
                if target.contains("home") {
                    Some(Page::Home)
                } else {
                    None
                }
            }
        };
        if let Some(page) = next {
            self.goto(page);
        }
    }
}

#[async_trait]
impl WebEnvironment for StorefrontEnv {
    async fn observe(&mut self) -> Result<PageObservation> {
        Ok(self.page())
    }

    async fn step(&mut self, action: &Action) -> Result<StepOutcome> {
        match action {
            Action::Click { target } => self.click(target),
            Action::Type { target, .. } => {
                // typing into the search box counts as searching
                if self.current == Page::Home && target.to_lowercase().contains("search") {
                    self.goto(Page::Search);
                }
            }
            Action::Back => {
                if let Some(previous) = self.history.pop() {
                    self.current = previous;
                }
            }
            Action::GotoUrl { url } => {
                let lowered = url.to_lowercase();
                let page = if lowered.contains("search") {
                    Page::Search
                } else if lowered.contains("product") {
                    Page::Product
                } else if lowered.contains("cart") {
                    Page::Cart
                } else if lowered.contains("checkout") {
                    Page::Checkout
                } else {
                    Page::Home
                };
                self.goto(page);
            }
            // passive actions leave the page alone
            Action::Scroll { .. }
            | Action::Wait { .. }
            | Action::Read { .. }
            | Action::Hover { .. } => {}
            Action::Terminate { .. } => {}
        }

        let terminated = self.current == Page::Confirmation;
        Ok(StepOutcome {
            observation: self.page(),
            terminated,
            score: if terminated { Some(1.0) } else { None },
        })
    }

    async fn close(&mut self) -> Result<()> {
        debug!(target = "panel_run", url = %self.url(), "Storefront session closed");
        Ok(())
    }
}
